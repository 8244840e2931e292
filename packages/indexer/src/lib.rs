#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds street address containers.
//!
//! # Architecture
//!
//! - **Boundaries**: one scan of the map collects principal subdivisions
//!   and city boundaries and nests them into one tree per principal
//!   subdivision ([`boundary`]).
//! - **Places**: a second scan resolves every address and interpolation
//!   way to its innermost subdivision ([`resolve`]) and accumulates street
//!   drafts in a spill-to-disk cache ([`spill`]).
//! - **Finalize**: drafts are sorted, keyed phonetically and grouped into
//!   street tables, which are written to the street segment. The trees and
//!   the segment are then assembled into the container and published
//!   atomically ([`assembler`]).

pub mod assembler;
pub mod boundary;
pub mod progress;
pub mod resolve;
pub mod spill;

use std::path::{Path, PathBuf};
use std::time::Instant;

use street_index_format::FormatError;
use street_index_map::{MapError, MapSource};
use street_index_models::{IndexStats, IndexerConfig, SkipCounts};
use street_index_rules::{CountryRules, RulesError};

pub use assembler::StreetAssembler;
pub use progress::{NullProgress, ProgressCallback, ThrottledProgress};

/// File extension of address containers.
pub const CONTAINER_EXTENSION: &str = "addresses";

/// Errors from building an address container.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// Map read error.
    #[error("Map error: {0}")]
    Map(#[from] MapError),

    /// Country rules error.
    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    /// Container encoding error.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A spilled street draft could not be encoded.
    #[error("Spill encode error: {0}")]
    SpillEncode(#[from] rmp_serde::encode::Error),

    /// A spilled street draft could not be decoded.
    #[error("Spill decode error: {0}")]
    SpillDecode(#[from] rmp_serde::decode::Error),

    /// Async task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The map has no principal subdivisions of the country.
    #[error("No principal subdivisions of {0} found in the map")]
    NoPrincipalSubdivisions(String),
}

/// Why a map element was left out of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("no usable geometry")]
    GeometryMissing,
    #[error("outside every known subdivision")]
    SubdivisionUnresolved,
    #[error("unparseable house number")]
    HouseNumberUnparseable,
    #[error("unsupported interpolation kind")]
    InterpolationUnsupported,
    #[error("interpolation without addressed nodes")]
    InterpolationWithoutAddresses,
}

impl SkipReason {
    pub const fn count(self, counts: &mut SkipCounts) {
        let counter = match self {
            Self::GeometryMissing => &mut counts.geometry_missing,
            Self::SubdivisionUnresolved => &mut counts.subdivision_unresolved,
            Self::HouseNumberUnparseable => &mut counts.house_number_unparseable,
            Self::InterpolationUnsupported => &mut counts.interpolation_unsupported,
            Self::InterpolationWithoutAddresses => &mut counts.interpolation_without_addresses,
        };
        *counter += 1;
    }
}

/// Default container path for a map: `<map stem>.<country>.addresses`
/// next to the map file.
#[must_use]
pub fn default_output_path(map_path: &Path, country: &str) -> PathBuf {
    let file_name = map_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("map");
    let stem = file_name
        .strip_suffix(".osm.pbf")
        .or_else(|| file_name.rsplit_once('.').map(|(stem, _)| stem))
        .unwrap_or(file_name);

    map_path.with_file_name(format!(
        "{stem}.{}.{CONTAINER_EXTENSION}",
        country.to_lowercase()
    ))
}

/// Builds an address container from a map.
///
/// This is the main entry point for container construction. It:
/// 1. Discovers and nests the country's boundaries
/// 2. Streams every addressable element into street drafts
/// 3. Writes street tables, subdivision trees and the container
///
/// # Errors
///
/// Returns an error if the country has no rules, the map has no principal
/// subdivisions of the country, or reading or writing fails.
pub async fn build_index(
    map: &dyn MapSource,
    config: &IndexerConfig,
    output: &Path,
    progress: &dyn ProgressCallback,
) -> Result<IndexStats, IndexerError> {
    let start = Instant::now();
    let rules = CountryRules::for_country(&config.country)?;
    tokio::fs::create_dir_all(&config.work_dir).await?;

    log::info!("Discovering {} boundaries", rules.country());
    progress.set_message("Scanning boundaries".to_string());
    let principals = boundary::discover_boundaries(map, &rules, progress).await?;
    if principals.is_empty() {
        return Err(IndexerError::NoPrincipalSubdivisions(rules.country().to_string()));
    }

    log::info!("Indexing addresses");
    progress.set_message("Indexing addresses".to_string());
    let mut assembler = StreetAssembler::new(&rules, principals, config).await?;
    assembler.index_places(map, progress).await?;

    progress.set_message("Writing container".to_string());
    let checksum = map.checksum().await?;
    let mut stats = assembler.finalize(&checksum, output).await?;
    stats.build_time_secs = start.elapsed().as_secs_f64();

    #[allow(clippy::cast_precision_loss)]
    let mb = stats.container_size_bytes as f64 / 1_048_576.0;
    log::info!(
        "Container built: {} subdivisions, {} streets, {} addresses, {} interpolations, {mb:.1} MB, {:.1}s",
        stats.subdivisions,
        stats.streets,
        stats.addresses,
        stats.interpolations,
        stats.build_time_secs
    );
    progress.finish(format!("{} streets indexed", stats.streets));

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use street_index_format::{decode_street_table, decode_tree, read_blob, read_header};
    use street_index_map::{MemoryMapBuilder, MemoryMapSource};
    use street_index_models::{ElementRef, Subdivision};

    use super::*;

    fn square(map: &mut MemoryMapBuilder, id: i64, x: f64, y: f64, size: f64, tags: &[(&str, &str)]) {
        let first = id * 10;
        map.node(first, y, x, &[])
            .node(first + 1, y, x + size, &[])
            .node(first + 2, y + size, x + size, &[])
            .node(first + 3, y + size, x, &[])
            .way(id, &[first, first + 1, first + 2, first + 3, first], tags);
    }

    fn sample() -> MemoryMapSource {
        let mut map = MemoryMapSource::builder();
        square(&mut map, 1, 0.0, 0.0, 10.0, &[("ISO3166-2", "CA-ON"), ("name", "Ontario")]);
        square(
            &mut map,
            2,
            1.0,
            1.0,
            4.0,
            &[
                ("type", "boundary"),
                ("boundary", "administrative"),
                ("admin_level", "8"),
                ("name", "Springfield"),
            ],
        );
        map.end_segment();
        map.node(1000, 2.0, 2.0, &[("addr:housenumber", "1337"), ("addr:street", "Main Street")])
            .node(1001, 2.1, 2.0, &[("addr:housenumber", "12A"), ("addr:street", "Main Street")])
            .node(1002, 2.2, 2.0, &[("addr:housenumber", "n/a"), ("addr:street", "Main Street")])
            .node(1003, 50.0, 50.0, &[("addr:housenumber", "1"), ("addr:street", "Main Street")])
            .node(1004, 7.0, 7.0, &[("addr:housenumber", "8"), ("addr:street", "Rural Road")])
            .node(1005, 3.0, 3.0, &[("addr:housenumber", "100"), ("addr:street", "Oak Avenue")])
            .node(1006, 3.0, 3.5, &[("addr:housenumber", "200"), ("addr:street", "Oak Avenue")])
            .way(2000, &[1005, 1006], &[("addr:interpolation", "even")])
            .way(2001, &[1005, 1006], &[("addr:interpolation", "alphabetic")]);
        map.build(None)
    }

    fn node<'a>(sub: &'a Subdivision, name: &str) -> Option<&'a Subdivision> {
        if sub.name == name {
            return Some(sub);
        }
        sub.children.iter().find_map(|c| node(c, name))
    }

    #[tokio::test]
    async fn builds_a_readable_container() {
        let dir = std::env::temp_dir().join("street_index_indexer_build");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let map = sample();
        let config = IndexerConfig::new("CA", dir.join("work"));
        let output = dir.join("sample.ca.addresses");
        let stats = build_index(&map, &config, &output, &NullProgress).await.unwrap();

        assert_eq!(stats.principal_subdivisions, 1);
        assert_eq!(stats.subdivisions, 2);
        assert_eq!(stats.streets, 3);
        assert_eq!(stats.interpolations, 1);
        assert_eq!(stats.skipped.house_number_unparseable, 1);
        assert_eq!(stats.skipped.subdivision_unresolved, 1);
        assert_eq!(stats.skipped.interpolation_unsupported, 1);
        assert!(!dir.join("sample.ca.addresses.tmp").exists());

        let mut file = tokio::fs::File::open(&output).await.unwrap();
        let checksum = map.checksum().await.unwrap();
        let header = read_header(&mut file, Some(&checksum)).await.unwrap();
        let entry = header.principal("ON").unwrap().clone();
        let tree = decode_tree(&read_blob(&mut file, entry.offset, entry.length).await.unwrap()).unwrap();
        assert_eq!(tree.code, "CA-ON");

        let root_ref = tree.root.streets.unwrap();
        let rural = decode_street_table(
            &read_blob(&mut file, header.street_table_offset(&root_ref), root_ref.length)
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(rural.groups.len(), 1);
        assert_eq!(rural.groups[0].streets[0].full_name, "Rural Road");

        let springfield = node(&tree.root, "Springfield").unwrap();
        let table_ref = springfield.streets.unwrap();
        let table = decode_street_table(
            &read_blob(&mut file, header.street_table_offset(&table_ref), table_ref.length)
                .await
                .unwrap(),
        )
        .unwrap();

        let streets: Vec<_> = table.groups.iter().flat_map(|g| &g.streets).collect();
        let main = streets.iter().find(|s| s.full_name == "Main Street").unwrap();
        let numbers: Vec<(u32, &str)> = main
            .addresses
            .iter()
            .map(|a| (a.number, a.suffix.as_str()))
            .collect();
        assert_eq!(numbers, vec![(12, "A"), (1337, "")]);

        let oak = streets.iter().find(|s| s.full_name == "Oak Avenue").unwrap();
        assert!(oak.addresses.is_empty());
        assert_eq!(oak.interpolations.len(), 1);
        assert_eq!((oak.interpolations[0].start, oak.interpolations[0].end), (100, 200));
        assert_eq!(oak.interpolations[0].step, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn indexes_building_addresses_by_their_outline() {
        let dir = std::env::temp_dir().join("street_index_indexer_buildings");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut map = MemoryMapSource::builder();
        square(&mut map, 1, 0.0, 0.0, 10.0, &[("ISO3166-2", "CA-ON"), ("name", "Ontario")]);
        square(&mut map, 2, 10.0, 0.0, 10.0, &[("ISO3166-2", "CA-QC"), ("name", "Quebec")]);
        square(
            &mut map,
            3,
            1.0,
            1.0,
            4.0,
            &[
                ("type", "boundary"),
                ("boundary", "administrative"),
                ("admin_level", "8"),
                ("name", "Springfield"),
            ],
        );
        map.end_segment();
        let building = |number| {
            [
                ("building", "yes"),
                ("addr:housenumber", number),
                ("addr:street", "Elm Street"),
            ]
        };
        square(&mut map, 300, 2.0, 2.0, 0.5, &building("42"));
        // Crosses the Ontario/Quebec border with its centroid in Quebec.
        square(&mut map, 301, 9.8, 5.0, 0.6, &building("7"));
        let map = map.build(None);

        let config = IndexerConfig::new("CA", dir.join("work"));
        let output = dir.join("buildings.ca.addresses");
        let stats = build_index(&map, &config, &output, &NullProgress).await.unwrap();
        assert_eq!(stats.principal_subdivisions, 2);
        assert_eq!(stats.addresses, 2);
        assert_eq!(stats.skipped.total(), 0);

        let mut file = tokio::fs::File::open(&output).await.unwrap();
        let header = read_header(&mut file, None).await.unwrap();

        let entry = header.principal("ON").unwrap().clone();
        let ontario = decode_tree(&read_blob(&mut file, entry.offset, entry.length).await.unwrap()).unwrap();
        let table_ref = node(&ontario.root, "Springfield").unwrap().streets.unwrap();
        let table = decode_street_table(
            &read_blob(&mut file, header.street_table_offset(&table_ref), table_ref.length)
                .await
                .unwrap(),
        )
        .unwrap();
        let elm = &table.groups[0].streets[0];
        assert_eq!(elm.full_name, "Elm Street");
        assert_eq!(elm.addresses[0].element, ElementRef::way(300));
        assert_eq!(elm.addresses[0].number, 42);

        let entry = header.principal("QC").unwrap().clone();
        let quebec = decode_tree(&read_blob(&mut file, entry.offset, entry.length).await.unwrap()).unwrap();
        let table_ref = quebec.root.streets.unwrap();
        let table = decode_street_table(
            &read_blob(&mut file, header.street_table_offset(&table_ref), table_ref.length)
                .await
                .unwrap(),
        )
        .unwrap();
        let elm = &table.groups[0].streets[0];
        assert_eq!(elm.addresses[0].element, ElementRef::way(301));
        assert_eq!(elm.addresses[0].number, 7);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn fails_without_principal_subdivisions() {
        let dir = std::env::temp_dir().join("street_index_indexer_empty");
        let _ = std::fs::remove_dir_all(&dir);

        let mut map = MemoryMapSource::builder();
        map.node(1, 0.0, 0.0, &[("addr:housenumber", "1"), ("addr:street", "Main Street")]);
        let map = map.build(None);

        let config = IndexerConfig::new("CA", dir.join("work"));
        let err = build_index(&map, &config, &dir.join("out.addresses"), &NullProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::NoPrincipalSubdivisions(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_output_path_uses_map_stem() {
        assert_eq!(
            default_output_path(Path::new("/data/ontario-latest.osm.pbf"), "CA"),
            PathBuf::from("/data/ontario-latest.ca.addresses")
        );
        assert_eq!(
            default_output_path(Path::new("quebec.pbf"), "ca"),
            PathBuf::from("quebec.ca.addresses")
        );
    }
}
