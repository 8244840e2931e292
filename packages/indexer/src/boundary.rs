//! Boundary discovery and nesting.
//!
//! One pass over the map collects principal subdivisions (ways and
//! relations whose `ISO3166-2` tag belongs to the country) and city
//! boundaries (admin levels listed in the country rules). Each city is
//! assigned to the principal subdivision containing it and then nested by
//! admin level, deepest first. A boundary that no boundary one level up
//! contains is promoted to that level instead of being dropped.

use std::collections::{BTreeSet, HashMap};

use geo::{Centroid, MultiPolygon, Point};
use street_index_format::table_code;
use street_index_map::{MapElement, MapSource, geometry};
use street_index_models::{Coordinate, ElementKind, ElementRef, StreetTableRef, Subdivision};
use street_index_rules::CountryRules;

use crate::IndexerError;
use crate::progress::ProgressCallback;
use crate::resolve::first_containing;

/// A boundary with its shape, as used while building.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub name: String,
    pub element: ElementRef,
    pub admin_level: Option<u8>,
    pub shape: MultiPolygon<f64>,
    pub centroid: Point<f64>,
    pub children: Vec<Self>,
}

impl Boundary {
    /// Returns `None` for shapes without a centroid.
    #[must_use]
    pub fn new(
        name: String,
        element: ElementRef,
        admin_level: Option<u8>,
        shape: MultiPolygon<f64>,
    ) -> Option<Self> {
        let centroid = shape.centroid()?;
        Some(Self {
            name,
            element,
            admin_level,
            shape,
            centroid,
            children: Vec::new(),
        })
    }

    /// Number of boundaries in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Child routes of every node in pre-order, starting with `[]` for
    /// `self`.
    #[must_use]
    pub fn routes(&self) -> Vec<Vec<usize>> {
        fn walk(node: &Boundary, route: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            out.push(route.clone());
            for (i, child) in node.children.iter().enumerate() {
                route.push(i);
                walk(child, route, out);
                route.pop();
            }
        }

        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }

    /// Converts to the persisted tree, attaching street tables by route.
    pub(crate) fn to_subdivision(
        &self,
        route: &mut Vec<usize>,
        tables: &HashMap<Vec<usize>, StreetTableRef>,
    ) -> Subdivision {
        let children = self
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                route.push(i);
                let sub = child.to_subdivision(route, tables);
                route.pop();
                sub
            })
            .collect();

        Subdivision {
            name: self.name.clone(),
            element: self.element,
            centroid: Coordinate {
                lat: self.centroid.y(),
                lon: self.centroid.x(),
            },
            streets: tables.get(route.as_slice()).copied(),
            children,
        }
    }
}

/// A principal subdivision and everything nested inside it.
#[derive(Debug, Clone)]
pub struct PrincipalBoundary {
    /// Full ISO 3166-2 code, e.g. `CA-ON`.
    pub code: String,
    pub root: Boundary,
}

struct Candidate {
    element: ElementRef,
    name: String,
    admin_level: Option<u8>,
}

impl Candidate {
    fn from_element(element: &MapElement, admin_level: Option<u8>) -> Self {
        Self {
            element: element.element,
            name: element
                .tag("name")
                .map_or_else(|| element.element.to_string(), str::to_string),
            admin_level,
        }
    }

    async fn load(self, map: &dyn MapSource) -> Result<Option<Boundary>, IndexerError> {
        let Some(geometry) = map.geometry(self.element).await? else {
            log::warn!("Boundary {} ({}) has no geometry", self.name, self.element);
            return Ok(None);
        };
        let Some(shape) = geometry::polygonal(&geometry) else {
            log::warn!("Boundary {} ({}) is not an area", self.name, self.element);
            return Ok(None);
        };
        Ok(Boundary::new(self.name, self.element, self.admin_level, shape))
    }
}

/// Scans the map and assembles one boundary tree per principal
/// subdivision, sorted by code.
///
/// # Errors
///
/// Returns an error if the map cannot be read.
pub async fn discover_boundaries(
    map: &dyn MapSource,
    rules: &CountryRules,
    progress: &dyn ProgressCallback,
) -> Result<Vec<PrincipalBoundary>, IndexerError> {
    let mut principal_candidates = Vec::new();
    let mut city_candidates = Vec::new();

    progress.set_total(map.size());
    let mut offset = 0;
    loop {
        let segment = map.read_segment(offset).await?;
        if segment.size == 0 {
            break;
        }

        for element in &segment.elements {
            if element.element.kind == ElementKind::Node {
                continue;
            }
            if let Some(code) = rules.principal_code(&element.tags) {
                principal_candidates.push((code.to_string(), Candidate::from_element(element, None)));
            } else if let Some(level) = rules.city_level(&element.tags) {
                city_candidates.push(Candidate::from_element(element, Some(level)));
            }
        }

        offset += segment.size;
        progress.set_position(offset);
    }

    log::info!(
        "Found {} principal subdivision and {} city boundary candidates",
        principal_candidates.len(),
        city_candidates.len()
    );

    let mut principals = Vec::new();
    let mut seen = BTreeSet::new();
    for (code, candidate) in principal_candidates {
        if let Err(e) = table_code(&code) {
            log::warn!("Skipping principal subdivision {}: {e}", candidate.element);
            continue;
        }
        if seen.contains(&code) {
            log::warn!("Duplicate principal subdivision {code} on {}", candidate.element);
            continue;
        }
        if let Some(root) = candidate.load(map).await? {
            seen.insert(code.clone());
            principals.push(PrincipalBoundary { code, root });
        }
    }
    principals.sort_by(|a, b| a.code.cmp(&b.code));

    let mut levels: Vec<Vec<Vec<Boundary>>> = principals
        .iter()
        .map(|p| vec![Vec::new(); rules.boundary_rule(&p.code).city_admin_levels.len()])
        .collect();

    for candidate in city_candidates {
        let Some(city) = candidate.load(map).await? else {
            continue;
        };
        let Some(owner) = first_containing(&principals, city.centroid, |p| {
            geometry::contains_parts(&p.root.shape, &city.shape)
        }) else {
            log::warn!("City {} ({}) is outside every principal subdivision", city.name, city.element);
            continue;
        };

        let rule = rules.boundary_rule(&principals[owner].code);
        let Some(depth) = city.admin_level.and_then(|level| rule.level_index(level)) else {
            log::debug!(
                "City {} ({}) has admin level {:?}, not a city level in {}",
                city.name,
                city.element,
                city.admin_level,
                principals[owner].code
            );
            continue;
        };
        levels[owner][depth].push(city);
    }

    for (principal, levels) in principals.iter_mut().zip(levels) {
        principal.root.children = nest(levels);
        log::info!(
            "{}: {} subdivisions",
            principal.code,
            principal.root.node_count()
        );
        log_tree(&principal.root, 0);
    }

    Ok(principals)
}

/// Nests boundaries grouped by level (outermost first) and returns the
/// outermost level.
fn nest(mut levels: Vec<Vec<Boundary>>) -> Vec<Boundary> {
    while let Some(deepest) = levels.pop() {
        let Some(parents) = levels.last_mut() else {
            return deepest;
        };

        let mut promoted = Vec::new();
        for boundary in deepest {
            let parent = first_containing(parents, boundary.centroid, |p| {
                geometry::contains_parts(&p.shape, &boundary.shape)
            });
            match parent {
                Some(i) => parents[i].children.push(boundary),
                None => promoted.push(boundary),
            }
        }
        parents.extend(promoted);
    }

    Vec::new()
}

fn log_tree(node: &Boundary, depth: usize) {
    log::debug!(
        "{:indent$}{} ({})",
        "",
        node.name,
        node.element,
        indent = depth * 2
    );
    for child in &node.children {
        log_tree(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use street_index_map::{MemoryMapBuilder, MemoryMapSource};

    use super::*;
    use crate::progress::NullProgress;

    fn square(map: &mut MemoryMapBuilder, id: i64, x: f64, y: f64, size: f64, tags: &[(&str, &str)]) {
        let first = id * 10;
        map.node(first, y, x, &[])
            .node(first + 1, y, x + size, &[])
            .node(first + 2, y + size, x + size, &[])
            .node(first + 3, y + size, x, &[])
            .way(id, &[first, first + 1, first + 2, first + 3, first], tags);
    }

    fn city<'a>(name: &'a str, level: &'a str) -> [(&'a str, &'a str); 4] {
        [
            ("type", "boundary"),
            ("boundary", "administrative"),
            ("admin_level", level),
            ("name", name),
        ]
    }

    fn sample() -> MemoryMapSource {
        let mut map = MemoryMapSource::builder();
        square(&mut map, 1, 0.0, 0.0, 10.0, &[("ISO3166-2", "CA-ON"), ("name", "Ontario")]);
        square(&mut map, 2, 20.0, 0.0, 10.0, &[("ISO3166-2", "CA-BC"), ("name", "British Columbia")]);
        square(&mut map, 3, 1.0, 1.0, 4.0, &city("Ottawa County", "6"));
        square(&mut map, 4, 1.5, 1.5, 1.0, &city("Springfield", "8"));
        square(&mut map, 5, 7.0, 7.0, 1.0, &city("Hamlet", "8"));
        square(&mut map, 6, 21.0, 1.0, 4.0, &city("Regional District", "6"));
        square(&mut map, 7, 22.0, 2.0, 1.0, &city("Victoria", "8"));
        square(&mut map, 8, 50.0, 50.0, 1.0, &city("Nowhere", "8"));
        map.build(None)
    }

    #[tokio::test]
    async fn nests_cities_by_level_and_promotes_orphans() {
        let map = sample();
        let rules = CountryRules::for_country("CA").unwrap();
        let principals = discover_boundaries(&map, &rules, &NullProgress).await.unwrap();

        let codes: Vec<&str> = principals.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(codes, vec!["CA-BC", "CA-ON"]);

        let on = &principals[1];
        let top: Vec<&str> = on.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(top, vec!["Ottawa County", "Hamlet"]);
        assert_eq!(on.root.children[0].children[0].name, "Springfield");
        assert_eq!(on.root.node_count(), 4);
    }

    #[tokio::test]
    async fn applies_per_subdivision_levels() {
        let map = sample();
        let rules = CountryRules::for_country("CA").unwrap();
        let principals = discover_boundaries(&map, &rules, &NullProgress).await.unwrap();

        let bc = &principals[0];
        let names: Vec<&str> = bc.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Victoria"]);
    }

    #[test]
    fn routes_are_pre_order() {
        let shape = |x: f64| {
            MultiPolygon::new(vec![geo::polygon![
                (x: x, y: 0.0),
                (x: x + 1.0, y: 0.0),
                (x: x + 1.0, y: 1.0),
                (x: x, y: 0.0),
            ]])
        };
        let leaf = |x: f64| Boundary::new("n".to_string(), ElementRef::way(1), None, shape(x)).unwrap();

        let mut root = leaf(0.0);
        let mut a = leaf(1.0);
        a.children.push(leaf(2.0));
        root.children.push(a);
        root.children.push(leaf(3.0));

        assert_eq!(root.routes(), vec![vec![], vec![0], vec![0, 0], vec![1]]);
    }
}
