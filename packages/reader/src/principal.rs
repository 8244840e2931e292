//! A decoded principal subdivision.

use std::collections::{BTreeMap, HashMap};

use street_index_models::{Coordinate, ElementRef, PrincipalTree, StreetTable, StreetTableRef, Subdivision};
use street_index_phonetic::{Language, damerau_levenshtein, expand, phonetic_key};

use crate::cache::CoalescingLru;

/// One subdivision of the flattened tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub element: ElementRef,
    pub centroid: Coordinate,
    pub streets: Option<StreetTableRef>,
    /// One past the last node of this subtree; the subtree is
    /// `index..end` in pre-order.
    pub end: usize,
}

#[derive(Debug, Clone)]
struct NameEntry {
    rank: u64,
    expanded: String,
    node: usize,
}

/// A principal subdivision tree flattened in pre-order, with its name
/// index and its own street table cache.
pub struct Principal {
    /// Full ISO 3166-2 code.
    pub code: String,
    pub language: Language,
    nodes: Vec<Node>,
    by_bucket: BTreeMap<char, Vec<NameEntry>>,
    by_name: HashMap<String, usize>,
    pub(crate) streets: CoalescingLru<usize, StreetTable>,
}

fn flatten(sub: Subdivision, nodes: &mut Vec<Node>) {
    let index = nodes.len();
    nodes.push(Node {
        name: sub.name,
        element: sub.element,
        centroid: sub.centroid,
        streets: sub.streets,
        end: index + 1,
    });
    for child in sub.children {
        flatten(child, nodes);
    }
    nodes[index].end = nodes.len();
}

impl Principal {
    #[must_use]
    pub fn new(tree: PrincipalTree, language: Language, street_cache_entries: usize) -> Self {
        let mut nodes = Vec::with_capacity(tree.root.node_count());
        flatten(tree.root, &mut nodes);

        let mut by_bucket: BTreeMap<char, Vec<NameEntry>> = BTreeMap::new();
        let mut by_name = HashMap::new();
        for (index, node) in nodes.iter().enumerate().skip(1) {
            // Later subdivisions replace earlier ones of the same name.
            by_name.insert(node.name.to_lowercase(), index);

            let expanded = expand(&node.name, language).full();
            let key = phonetic_key(&expanded, language, true, false);
            by_bucket.entry(key.bucket).or_default().push(NameEntry {
                rank: key.rank,
                expanded,
                node: index,
            });
        }
        for entries in by_bucket.values_mut() {
            entries.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.expanded.cmp(&b.expanded)));
        }

        log::debug!("Loaded {} with {} subdivisions", tree.code, nodes.len());

        Self {
            code: tree.code,
            language,
            nodes,
            by_bucket,
            by_name,
            streets: CoalescingLru::new(street_cache_entries),
        }
    }

    #[must_use]
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Subdivisions whose names fuzzily match `query`, closest first by
    /// edit distance of the expanded names.
    #[must_use]
    pub fn search_names(&self, query: &str, limit: usize) -> Vec<usize> {
        let expanded = expand(query, self.language).full();
        let key = phonetic_key(&expanded, self.language, true, false);
        let Some(entries) = self.by_bucket.get(&key.bucket) else {
            return Vec::new();
        };

        let (low, high) = key.window();
        let start = entries.partition_point(|e| e.rank < low);
        let mut matches: Vec<(usize, usize)> = entries[start..]
            .iter()
            .take_while(|e| e.rank <= high)
            .map(|e| (damerau_levenshtein(&expanded, &e.expanded), e.node))
            .collect();
        matches.sort_by_key(|(distance, _)| *distance);

        matches.into_iter().take(limit).map(|(_, node)| node).collect()
    }

    /// Resolves a city name: exact (case-insensitive) name first, then the
    /// closest fuzzy match.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .copied()
            .or_else(|| self.search_names(name, 1).first().copied())
    }

    /// Street tables of a subdivision and everything below it.
    #[must_use]
    pub fn subtree_tables(&self, index: usize) -> Vec<(usize, StreetTableRef)> {
        let end = self.nodes[index].end;
        (index..end)
            .filter_map(|i| self.nodes[i].streets.map(|table| (i, table)))
            .collect()
    }
}
