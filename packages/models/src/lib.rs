#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the street address index.
//!
//! This crate contains only data types, configuration structs, and simple
//! conversions. It has no heavyweight dependencies (no geometry, no I/O).
//! Everything that is persisted inside an address container is defined
//! here so that the indexer and the reader agree on a single shape.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Length in bytes of the map checksum stored in every container.
pub const CHECKSUM_LEN: usize = 64;

/// Digest of the map an address container was built from.
pub type Checksum = [u8; CHECKSUM_LEN];

/// Kind of a map element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// A single coordinate.
    Node,
    /// An ordered list of nodes.
    Way,
    /// A collection of members with roles.
    Relation,
}

impl ElementKind {
    /// Short lowercase tag used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a map element by kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: i64,
}

impl ElementRef {
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
        }
    }

    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self {
            kind: ElementKind::Way,
            id,
        }
    }

    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self {
            kind: ElementKind::Relation,
            id,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Location of a serialized street table inside the street segment.
///
/// `offset` is relative to the start of the street segment, not the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetTableRef {
    pub offset: u64,
    pub length: u32,
}

/// A node of the persisted administrative tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subdivision {
    /// Display name taken from the boundary's `name` tag.
    pub name: String,
    /// The boundary element this subdivision was built from.
    pub element: ElementRef,
    /// Centroid of the boundary shape.
    pub centroid: Coordinate,
    /// Street table owned directly by this subdivision, if any addresses
    /// resolved to it.
    pub streets: Option<StreetTableRef>,
    pub children: Vec<Self>,
}

impl Subdivision {
    /// Number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

/// A top-level (principal) subdivision blob as stored in the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalTree {
    /// Full ISO 3166-2 code such as `CA-ON`.
    pub code: String,
    pub root: Subdivision,
}

/// A discrete address belonging to a street.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub element: ElementRef,
    /// Display name of the addressed place (`ref - name`, brand, ...).
    pub name: String,
    pub unit: String,
    pub number: u32,
    pub suffix: String,
}

impl Address {
    /// Ordering used for the address list of a street: number, then
    /// suffix, then unit. Empty suffixes and units sort last; non-empty
    /// ones compare by length and then lexically.
    #[must_use]
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| compare_sparse(&self.suffix, &other.suffix))
            .then_with(|| compare_sparse(&self.unit, &other.unit))
    }
}

fn compare_sparse(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// A house number range given by an interpolation way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpolation {
    pub way_id: i64,
    pub start: u32,
    pub end: u32,
    /// Always at least 1.
    pub step: u32,
}

impl Interpolation {
    /// Whether `number` lies inside the range on the step grid.
    #[must_use]
    pub const fn covers(&self, number: u32) -> bool {
        self.start <= number
            && number <= self.end
            && matches!((number - self.start).checked_rem(self.step), Some(0))
    }
}

/// All addresses of one street within one subdivision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetRecord {
    /// Name as first seen in `addr:street`.
    pub full_name: String,
    /// Expanded name used for phonetic keys and distance ranking.
    pub phonetic_name: String,
    pub addresses: Vec<Address>,
    pub interpolations: Vec<Interpolation>,
}

impl StreetRecord {
    /// Smallest and largest house number covered by this street, combining
    /// discrete addresses and interpolation ranges.
    #[must_use]
    pub fn number_span(&self) -> Option<(u32, u32)> {
        let discrete = self.addresses.iter().map(|a| (a.number, a.number));
        let ranges = self.interpolations.iter().map(|i| (i.start, i.end));

        discrete
            .chain(ranges)
            .reduce(|(lo, hi), (start, end)| (lo.min(start), hi.max(end)))
    }
}

/// Streets of one subdivision that share a phonetic bucket.
///
/// `ranks`, `min_numbers` and `max_numbers` run parallel to `streets` and
/// `ranks` is sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetGroup {
    pub bucket: char,
    pub ranks: Vec<u64>,
    pub min_numbers: Vec<u32>,
    pub max_numbers: Vec<u32>,
    pub streets: Vec<StreetRecord>,
}

/// The street table of one subdivision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetTable {
    pub groups: Vec<StreetGroup>,
}

impl StreetTable {
    #[must_use]
    pub fn group(&self, bucket: char) -> Option<&StreetGroup> {
        self.groups.iter().find(|g| g.bucket == bucket)
    }
}

/// A structured address query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    pub unit: String,
    pub number: u32,
    pub suffix: String,
    pub street: String,
}

/// Options for an address search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of results.
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Resolve coordinates and the containing city name for every result.
    /// Requires a map source.
    #[serde(default)]
    pub full: bool,
}

const fn default_search_limit() -> usize {
    10
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            full: false,
        }
    }
}

/// A single address search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressResult {
    /// Addressed element, or the interpolation way.
    pub element: ElementRef,
    pub name: String,
    pub unit: String,
    pub street_number: u32,
    pub street_number_suffix: String,
    pub street_name: String,
    /// Subdivision whose street table held the match.
    pub subdivision: String,
    /// Principal subdivision code the search ran in.
    pub principal: String,
    /// `true` when the number came from an interpolation range.
    pub interpolated: bool,
    /// Set in full mode only.
    pub location: Option<Coordinate>,
    /// Set in full mode only.
    pub city: Option<String>,
}

/// Configuration for building an address container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// ISO 3166-1 alpha-2 country code, e.g. `CA`.
    pub country: String,

    /// Scratch directory for spilled street records.
    pub work_dir: PathBuf,

    /// Number of street records held in memory before spilling.
    /// Defaults to 10.
    #[serde(default = "default_street_cache_entries")]
    pub street_cache_entries: usize,
}

const fn default_street_cache_entries() -> usize {
    10
}

impl IndexerConfig {
    #[must_use]
    pub fn new(country: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            country: country.into(),
            work_dir: work_dir.into(),
            street_cache_entries: default_street_cache_entries(),
        }
    }
}

/// Configuration for opening an address container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// ISO 3166-1 alpha-2 country code, e.g. `CA`.
    pub country: String,

    /// Number of decoded principal subdivision trees kept in memory.
    /// Defaults to 4.
    #[serde(default = "default_max_principal_cache")]
    pub max_principal_cache: usize,

    /// Number of decoded street tables kept in memory per principal
    /// subdivision. Defaults to 64.
    #[serde(default = "default_max_subdivision_cache")]
    pub max_subdivision_cache: usize,
}

const fn default_max_principal_cache() -> usize {
    4
}

const fn default_max_subdivision_cache() -> usize {
    64
}

impl ReaderConfig {
    #[must_use]
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            max_principal_cache: default_max_principal_cache(),
            max_subdivision_cache: default_max_subdivision_cache(),
        }
    }
}

/// Counts of map elements skipped during a build, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub geometry_missing: u64,
    pub subdivision_unresolved: u64,
    pub house_number_unparseable: u64,
    pub interpolation_unsupported: u64,
    pub interpolation_without_addresses: u64,
}

impl SkipCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.geometry_missing
            + self.subdivision_unresolved
            + self.house_number_unparseable
            + self.interpolation_unsupported
            + self.interpolation_without_addresses
    }
}

/// Statistics about a built address container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub principal_subdivisions: u64,
    pub subdivisions: u64,
    pub streets: u64,
    pub addresses: u64,
    pub interpolations: u64,
    pub skipped: SkipCounts,
    /// Container size on disk in bytes.
    pub container_size_bytes: u64,
    /// Time taken to build the container in seconds.
    pub build_time_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(number: u32, suffix: &str, unit: &str) -> Address {
        Address {
            element: ElementRef::node(1),
            name: String::new(),
            unit: unit.to_string(),
            number,
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn addresses_sort_by_number_then_suffix_then_unit() {
        let mut list = vec![
            address(12, "", ""),
            address(10, "", "2"),
            address(10, "B", ""),
            address(10, "", "10"),
            address(10, "A", ""),
            address(10, "1/2", ""),
        ];
        list.sort_by(Address::canonical_cmp);

        let keys: Vec<(u32, &str, &str)> = list
            .iter()
            .map(|a| (a.number, a.suffix.as_str(), a.unit.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (10, "A", ""),
                (10, "B", ""),
                (10, "1/2", ""),
                (10, "", "2"),
                (10, "", "10"),
                (12, "", ""),
            ]
        );
    }

    #[test]
    fn number_span_combines_addresses_and_interpolations() {
        let record = StreetRecord {
            addresses: vec![address(40, "", ""), address(12, "", "")],
            interpolations: vec![
                Interpolation {
                    way_id: 1,
                    start: 100,
                    end: 180,
                    step: 2,
                },
                Interpolation {
                    way_id: 2,
                    start: 2,
                    end: 20,
                    step: 2,
                },
            ],
            ..StreetRecord::default()
        };

        assert_eq!(record.number_span(), Some((2, 180)));
        assert_eq!(StreetRecord::default().number_span(), None);
    }

    #[test]
    fn interpolation_covers_only_step_multiples() {
        let range = Interpolation {
            way_id: 7,
            start: 100,
            end: 200,
            step: 2,
        };

        assert!(range.covers(100));
        assert!(range.covers(150));
        assert!(range.covers(200));
        assert!(!range.covers(151));
        assert!(!range.covers(98));
        assert!(!range.covers(202));
    }
}
