#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Queries street address containers.
//!
//! An [`AddressReader`] keeps the container's principal table in memory and
//! loads everything else on demand: decoded principal subdivision trees in
//! one LRU cache, and street tables in a second LRU cache per principal
//! subdivision. Concurrent misses on the same key share one load.

mod cache;
pub mod principal;
pub mod search;

use std::path::Path;
use std::sync::Arc;

use street_index_format::{
    ContainerHeader, FormatError, decode_street_table, decode_tree, read_blob, read_header,
};
use street_index_map::{MapError, MapSource, geometry};
use street_index_models::{
    AddressQuery, AddressResult, Coordinate, ReaderConfig, SearchOptions, StreetTable,
    StreetTableRef,
};
use street_index_rules::{CountryRules, RulesError};
use tokio::fs::File;
use tokio::sync::Mutex;

use crate::cache::CoalescingLru;
pub use crate::principal::{Node, Principal};
use crate::search::{Candidate, match_address};

/// Errors from opening or querying an address container.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// No subdivision of the region matches the city name.
    #[error("No subdivision named {0}")]
    SubdivisionNotFound(String),

    /// The city and everything below it hold no street tables.
    #[error("{0} has no addresses")]
    CityHasNoAddresses(String),

    /// The city has addresses, but none match.
    #[error("No address {number} {street} in {city}")]
    AddressNotFound {
        street: String,
        number: u32,
        city: String,
    },

    /// A free-text address does not follow the country's street address
    /// grammar.
    #[error("Unparseable address: {0}")]
    UnparseableAddress(String),

    /// The container has no principal subdivision with this code.
    #[error("No principal subdivision {0} in the container")]
    PrincipalNotFound(String),

    /// Full mode was requested on a reader opened without a map.
    #[error("Full search needs a map source")]
    MapUnavailable,

    /// Container format error.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Map read error.
    #[error("Map error: {0}")]
    Map(#[from] MapError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Country rules error.
    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),
}

/// An open address container.
pub struct AddressReader {
    file: Mutex<File>,
    header: ContainerHeader,
    rules: CountryRules,
    map: Option<Arc<dyn MapSource>>,
    config: ReaderConfig,
    principals: CoalescingLru<String, Principal>,
}

impl AddressReader {
    /// Opens a container. When a map is given its checksum must match the
    /// one stored in the container.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Format`] for a bad magic, a checksum mismatch
    /// or a truncated principal table, and [`ReaderError::Rules`] when the
    /// country has no rules.
    pub async fn open(
        path: impl AsRef<Path>,
        map: Option<Arc<dyn MapSource>>,
        config: ReaderConfig,
    ) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let rules = CountryRules::for_country(&config.country)?;

        let expected = match &map {
            Some(map) => Some(map.checksum().await?),
            None => None,
        };

        let mut file = File::open(path).await?;
        let header = read_header(&mut file, expected.as_ref()).await?;
        log::info!(
            "Opened {} with {} principal subdivisions",
            path.display(),
            header.principals.len()
        );

        Ok(Self {
            file: Mutex::new(file),
            header,
            rules,
            map,
            principals: CoalescingLru::new(config.max_principal_cache),
            config,
        })
    }

    /// Table codes of the container's principal subdivisions, e.g. `ON`.
    #[must_use]
    pub fn principal_codes(&self) -> Vec<&str> {
        self.header.principals.iter().map(|p| p.code.as_str()).collect()
    }

    async fn read(&self, offset: u64, length: u32) -> Result<Vec<u8>, ReaderError> {
        let mut file = self.file.lock().await;
        Ok(read_blob(&mut *file, offset, length).await?)
    }

    /// Decoded tree of a principal subdivision. Accepts the table code
    /// (`ON`) or the full code (`CA-ON`) in any case.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::PrincipalNotFound`] for an unknown region.
    pub async fn principal(&self, region: &str) -> Result<Arc<Principal>, ReaderError> {
        let region = region.trim();
        let code = region
            .split_once('-')
            .map_or(region, |(_, code)| code)
            .to_uppercase();
        let entry = self
            .header
            .principal(&code)
            .ok_or_else(|| ReaderError::PrincipalNotFound(region.to_string()))?
            .clone();

        self.principals
            .get_or_try_init(&code, || async {
                log::debug!("Loading principal subdivision {code}");
                let tree = decode_tree(&self.read(entry.offset, entry.length).await?)?;
                let language = self.rules.boundary_rule(&tree.code).default_language;
                Ok::<_, ReaderError>(Principal::new(
                    tree,
                    language,
                    self.config.max_subdivision_cache,
                ))
            })
            .await
    }

    /// Street table of one subdivision of `principal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or decoded.
    pub async fn street_table(
        &self,
        principal: &Principal,
        node: usize,
        table: StreetTableRef,
    ) -> Result<Arc<StreetTable>, ReaderError> {
        principal
            .streets
            .get_or_try_init(&node, || async {
                log::trace!("Loading street table of {}", principal.node(node).name);
                let offset = self.header.street_table_offset(&table);
                Ok::<_, ReaderError>(decode_street_table(
                    &self.read(offset, table.length).await?,
                )?)
            })
            .await
    }

    /// Subdivision names of a region fuzzily matching `name`, closest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::PrincipalNotFound`] for an unknown region.
    pub async fn search_city(
        &self,
        name: &str,
        region: &str,
        limit: usize,
    ) -> Result<Vec<String>, ReaderError> {
        let principal = self.principal(region).await?;
        Ok(principal
            .search_names(name, limit)
            .into_iter()
            .map(|i| principal.node(i).name.clone())
            .collect())
    }

    /// Finds addresses in `city` and every subdivision below it, closest
    /// street name first.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::SubdivisionNotFound`] when no subdivision
    /// matches `city`, [`ReaderError::CityHasNoAddresses`] when it holds no
    /// street tables, [`ReaderError::AddressNotFound`] when nothing
    /// matches, and [`ReaderError::MapUnavailable`] for a full search
    /// without a map.
    pub async fn search_address(
        &self,
        query: &AddressQuery,
        city: &str,
        region: &str,
        options: &SearchOptions,
    ) -> Result<Vec<AddressResult>, ReaderError> {
        if options.full && self.map.is_none() {
            return Err(ReaderError::MapUnavailable);
        }

        let principal = self.principal(region).await?;
        let node = principal
            .find(city)
            .ok_or_else(|| ReaderError::SubdivisionNotFound(city.to_string()))?;
        let city_name = principal.node(node).name.clone();

        let refs = principal.subtree_tables(node);
        if refs.is_empty() {
            return Err(ReaderError::CityHasNoAddresses(city_name));
        }

        let mut tables = Vec::with_capacity(refs.len());
        for (index, table) in refs {
            tables.push((index, self.street_table(&principal, index, table).await?));
        }

        let mut candidates = match_address(&principal, query, &tables);
        if candidates.is_empty() {
            return Err(ReaderError::AddressNotFound {
                street: query.street.clone(),
                number: query.number,
                city: city_name,
            });
        }
        candidates.truncate(options.limit);

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            results.push(match &self.map {
                Some(map) if options.full => self.locate(map.as_ref(), &principal, candidate).await?,
                _ => candidate.result,
            });
        }
        Ok(results)
    }

    /// Parses a free-text address with the country's grammar, then searches
    /// like [`Self::search_address`].
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::UnparseableAddress`] when `text` does not
    /// parse, otherwise the errors of [`Self::search_address`].
    pub async fn search_address_text(
        &self,
        text: &str,
        city: &str,
        region: &str,
        options: &SearchOptions,
    ) -> Result<Vec<AddressResult>, ReaderError> {
        let parsed = self
            .rules
            .parse_street_address(text)
            .ok_or_else(|| ReaderError::UnparseableAddress(text.to_string()))?;
        let query = AddressQuery {
            unit: parsed.unit,
            number: parsed.number.number,
            suffix: parsed.number.suffix,
            street: parsed.street,
        };
        self.search_address(&query, city, region, options).await
    }

    async fn locate(
        &self,
        map: &dyn MapSource,
        principal: &Principal,
        candidate: Candidate,
    ) -> Result<AddressResult, ReaderError> {
        let mut result = candidate.result;
        let shape = map.geometry(result.element).await?;

        let point = match (&candidate.interpolation, &shape) {
            (Some(range), Some(shape)) => geometry::linear(shape).and_then(|line| {
                let span = range.end.saturating_sub(range.start);
                let fraction = if span == 0 {
                    0.0
                } else {
                    f64::from(result.street_number - range.start) / f64::from(span)
                };
                geometry::point_along(&line, fraction)
            }),
            (None, Some(shape)) => geometry::centroid(shape),
            (_, None) => None,
        };
        if point.is_none() {
            log::warn!("No location for {}", result.element);
        }
        result.location = point.map(|p| Coordinate {
            lat: p.y(),
            lon: p.x(),
        });

        let node = principal.node(candidate.node);
        let city = map
            .element(node.element)
            .await?
            .and_then(|e| e.tag("name").map(str::to_string))
            .unwrap_or_else(|| node.name.clone());
        result.city = Some(city);

        Ok(result)
    }

    /// Closes the container.
    pub fn close(self) {
        log::debug!("Closing address container");
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use street_index_indexer::{NullProgress, build_index};
    use street_index_map::{MemoryMapBuilder, MemoryMapSource};
    use street_index_models::{ElementRef, IndexerConfig};

    use super::*;

    fn square(map: &mut MemoryMapBuilder, id: i64, x: f64, y: f64, size: f64, tags: &[(&str, &str)]) {
        let first = id * 10;
        map.node(first, y, x, &[])
            .node(first + 1, y, x + size, &[])
            .node(first + 2, y + size, x + size, &[])
            .node(first + 3, y + size, x, &[])
            .way(id, &[first, first + 1, first + 2, first + 3, first], tags);
    }

    fn city_tags<'a>(name: &'a str, level: &'a str) -> [(&'a str, &'a str); 4] {
        [
            ("type", "boundary"),
            ("boundary", "administrative"),
            ("admin_level", level),
            ("name", name),
        ]
    }

    fn sample() -> Arc<MemoryMapSource> {
        let mut map = MemoryMapSource::builder();
        square(&mut map, 1, 0.0, 0.0, 20.0, &[("ISO3166-2", "CA-ON"), ("name", "Ontario")]);
        square(&mut map, 5, 0.5, 0.5, 6.0, &city_tags("Greater Springfield", "6"));
        square(&mut map, 2, 1.0, 1.0, 4.0, &city_tags("Springfield", "8"));
        square(&mut map, 3, 10.0, 10.0, 4.0, &city_tags("Shelbyville", "8"));
        square(&mut map, 4, 15.0, 1.0, 2.0, &city_tags("Empty Hollow", "8"));
        map.end_segment();
        map.node(1000, 2.0, 2.0, &[("addr:housenumber", "1337"), ("addr:street", "Main Street")])
            .node(1001, 2.1, 2.0, &[("addr:housenumber", "12A"), ("addr:street", "Main Street")])
            .node(
                1002,
                2.2,
                2.0,
                &[("addr:housenumber", "12"), ("addr:street", "Main Street"), ("addr:unit", "4")],
            )
            .node(1007, 6.0, 6.0, &[("addr:housenumber", "1337"), ("addr:street", "Main Street")])
            .node(1003, 11.0, 11.0, &[("addr:housenumber", "1337"), ("addr:street", "Main St")])
            .node(1004, 11.5, 11.0, &[("addr:housenumber", "9"), ("addr:street", "Evergreen Terrace")])
            .node(1005, 3.0, 3.0, &[("addr:housenumber", "100"), ("addr:street", "Oak Avenue")])
            .node(1006, 3.0, 3.5, &[("addr:housenumber", "200"), ("addr:street", "Oak Avenue")])
            .way(2000, &[1005, 1006], &[("addr:interpolation", "even")]);
        Arc::new(map.build(None))
    }

    async fn fixture(name: &str) -> (PathBuf, PathBuf, Arc<MemoryMapSource>) {
        let dir = std::env::temp_dir().join(format!("street_index_reader_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let map = sample();
        let output = dir.join("sample.ca.addresses");
        let config = IndexerConfig::new("CA", dir.join("work"));
        build_index(map.as_ref(), &config, &output, &NullProgress).await.unwrap();
        (dir, output, map)
    }

    fn query(number: u32, street: &str) -> AddressQuery {
        AddressQuery {
            number,
            street: street.to_string(),
            ..AddressQuery::default()
        }
    }

    #[tokio::test]
    async fn finds_a_discrete_address() {
        let (dir, path, _map) = fixture("discrete").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();
        assert_eq!(reader.principal_codes(), vec!["ON"]);

        let results = reader
            .search_address(&query(1337, "Main St"), "Springfield", "ON", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.element, ElementRef::node(1000));
        assert_eq!(result.street_name, "Main Street");
        assert_eq!(result.subdivision, "Springfield");
        assert_eq!(result.principal, "CA-ON");
        assert!(!result.interpolated);
        assert!(result.location.is_none());

        reader.close();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn parent_subdivision_aggregates_children() {
        let (dir, path, _map) = fixture("aggregate").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();

        let results = reader
            .search_address(
                &query(1337, "Main Street"),
                "Greater Springfield",
                "on",
                &SearchOptions::default(),
            )
            .await
            .unwrap();
        let mut subdivisions: Vec<&str> = results.iter().map(|r| r.subdivision.as_str()).collect();
        subdivisions.sort_unstable();
        assert_eq!(subdivisions, vec!["Greater Springfield", "Springfield"]);

        let limited = reader
            .search_address(
                &query(1337, "Main Street"),
                "Greater Springfield",
                "on",
                &SearchOptions { limit: 1, full: false },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn numbers_survive_the_container_exactly() {
        let (dir, path, _map) = fixture("roundtrip").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();

        let results = reader
            .search_address(&query(12, "Main Street"), "Springfield", "ON", &SearchOptions::default())
            .await
            .unwrap();
        let mut found: Vec<(u32, &str, &str)> = results
            .iter()
            .map(|r| (r.street_number, r.street_number_suffix.as_str(), r.unit.as_str()))
            .collect();
        found.sort_unstable();
        assert_eq!(found, vec![(12, "", "4"), (12, "A", "")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn interpolation_covers_numbers_on_its_grid() {
        let (dir, path, _map) = fixture("interpolation").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();
        let options = SearchOptions::default();

        let results = reader
            .search_address(&query(150, "Oak Ave"), "Springfield", "ON", &options)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].interpolated);
        assert_eq!(results[0].element, ElementRef::way(2000));
        assert_eq!(results[0].street_number, 150);

        let err = reader
            .search_address(&query(151, "Oak Ave"), "Springfield", "ON", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::AddressNotFound { number: 151, .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn query_failures_have_distinct_kinds() {
        let (dir, path, _map) = fixture("failures").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();
        let options = SearchOptions::default();

        let err = reader
            .search_address(&query(1, "Main Street"), "Zzyzx", "ON", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::SubdivisionNotFound(_)));

        let err = reader
            .search_address(&query(1, "Main Street"), "Empty Hollow", "ON", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::CityHasNoAddresses(_)));

        let err = reader
            .search_address(&query(1337, "Nowhere Lane"), "Springfield", "ON", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::AddressNotFound { .. }));

        let err = reader.search_city("Springfield", "QC", 5).await.unwrap_err();
        assert!(matches!(err, ReaderError::PrincipalNotFound(_)));

        let full = SearchOptions { full: true, ..options };
        let err = reader
            .search_address(&query(1337, "Main Street"), "Springfield", "ON", &full)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::MapUnavailable));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn city_search_is_fuzzy() {
        let (dir, path, _map) = fixture("city").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();

        let names = reader.search_city("Springfeld", "ON", 5).await.unwrap();
        assert_eq!(names.first().map(String::as_str), Some("Springfield"));
        assert!(reader.search_city("Zzyzx", "ON", 5).await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn free_text_queries_are_parsed() {
        let (dir, path, _map) = fixture("text").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();
        let options = SearchOptions::default();

        let results = reader
            .search_address_text("4-12 Main Street", "Springfield", "ON", &options)
            .await
            .unwrap();
        let mut ids: Vec<i64> = results.iter().map(|r| r.element.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1001, 1002]);

        let results = reader
            .search_address_text("5-12 Main Street", "Springfield", "ON", &options)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].element, ElementRef::node(1001));

        let err = reader
            .search_address_text("Main Street", "Springfield", "ON", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::UnparseableAddress(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn full_mode_resolves_locations() {
        let (dir, path, map) = fixture("full").await;
        let source: Arc<dyn MapSource> = map;
        let reader = AddressReader::open(&path, Some(source), ReaderConfig::new("CA")).await.unwrap();
        let options = SearchOptions { limit: 10, full: true };

        let results = reader
            .search_address(&query(1337, "Main Street"), "Springfield", "ON", &options)
            .await
            .unwrap();
        let location = results[0].location.unwrap();
        assert!((location.lat - 2.0).abs() < 1e-9);
        assert!((location.lon - 2.0).abs() < 1e-9);
        assert_eq!(results[0].city.as_deref(), Some("Springfield"));

        let results = reader
            .search_address(&query(150, "Oak Avenue"), "Springfield", "ON", &options)
            .await
            .unwrap();
        let location = results[0].location.unwrap();
        assert!((location.lat - 3.0).abs() < 1e-6);
        assert!((location.lon - 3.25).abs() < 1e-3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn open_rejects_a_different_map() {
        let (dir, path, _map) = fixture("checksum").await;

        let mut other = MemoryMapSource::builder();
        other.node(1, 0.0, 0.0, &[]);
        let other: Arc<dyn MapSource> = Arc::new(other.build(Some([7; 64])));
        let err = AddressReader::open(&path, Some(other), ReaderConfig::new("CA"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::Format(FormatError::ChecksumMismatch)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn principal_trees_are_cached() {
        let (dir, path, _map) = fixture("cache").await;
        let reader = AddressReader::open(&path, None, ReaderConfig::new("CA")).await.unwrap();

        let first = reader.principal("ON").await.unwrap();
        let second = reader.principal("ca-on").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
