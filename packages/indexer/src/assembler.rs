//! Street assembly.
//!
//! [`StreetAssembler::index_places`] streams the map and files every
//! address and interpolation way under the street it belongs to in the
//! innermost subdivision containing it. [`StreetAssembler::finalize`]
//! turns those drafts into sorted, phonetically grouped street tables and
//! writes the container.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use geo::Point;
use serde::{Deserialize, Serialize};
use street_index_format::{ContainerWriter, StreetSegmentWriter};
use street_index_map::{ElementData, MapElement, MapSource};
use street_index_models::{
    Address, Checksum, ElementKind, ElementRef, IndexStats, IndexerConfig, Interpolation,
    PrincipalTree, StreetGroup, StreetRecord, StreetTable, StreetTableRef,
};
use street_index_phonetic::{Language, expand, phonetic_key};
use street_index_rules::CountryRules;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::boundary::PrincipalBoundary;
use crate::progress::ProgressCallback;
use crate::resolve::{Probe, Resolution, find_leaf_subdivision};
use crate::spill::SpillCache;
use crate::{IndexerError, SkipReason};

const SEGMENT_FILE_NAME: &str = "streets.segment";
const SPILL_DIR_NAME: &str = "spill";

/// Tags tried in order for the display name of an addressed place.
const NAME_TAGS: &[&str] = &["name", "brand", "amenity", "building"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreetKey {
    principal: usize,
    route: Vec<usize>,
    street: String,
}

/// A street under construction.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StreetDraft {
    addresses: Vec<Address>,
    interpolations: Vec<Interpolation>,
    /// Nodes of interpolation ways; excluded from the discrete addresses.
    interpolated_nodes: Vec<i64>,
}

impl StreetDraft {
    fn into_record(self, full_name: String, language: Language) -> Option<StreetRecord> {
        let covered: HashSet<i64> = self.interpolated_nodes.into_iter().collect();
        let mut addresses: Vec<Address> = self
            .addresses
            .into_iter()
            .filter(|a| !(a.element.kind == ElementKind::Node && covered.contains(&a.element.id)))
            .collect();
        addresses.sort_by(Address::canonical_cmp);

        let mut interpolations = self.interpolations;
        interpolations.sort_by_key(|i| (i.start, i.end, i.way_id));

        if addresses.is_empty() && interpolations.is_empty() {
            return None;
        }

        Some(StreetRecord {
            phonetic_name: expand(&full_name, language).full(),
            full_name,
            addresses,
            interpolations,
        })
    }
}

/// Groups streets by phonetic bucket. Groups are sorted by bucket and
/// streets within a group by rank, then full name.
#[must_use]
pub fn group_streets(records: Vec<StreetRecord>, language: Language) -> StreetTable {
    let mut buckets: BTreeMap<char, Vec<(u64, StreetRecord)>> = BTreeMap::new();
    for record in records {
        let key = phonetic_key(&record.phonetic_name, language, true, false);
        buckets.entry(key.bucket).or_default().push((key.rank, record));
    }

    let groups = buckets
        .into_iter()
        .map(|(bucket, mut entries)| {
            entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.full_name.cmp(&b.1.full_name)));

            let mut group = StreetGroup {
                bucket,
                ranks: Vec::with_capacity(entries.len()),
                min_numbers: Vec::with_capacity(entries.len()),
                max_numbers: Vec::with_capacity(entries.len()),
                streets: Vec::with_capacity(entries.len()),
            };
            for (rank, record) in entries {
                let (min, max) = record.number_span().unwrap_or_default();
                group.ranks.push(rank);
                group.min_numbers.push(min);
                group.max_numbers.push(max);
                group.streets.push(record);
            }
            group
        })
        .collect();

    StreetTable { groups }
}

/// Step of an `addr:interpolation` value. `None` for unsupported kinds.
fn interpolation_step(kind: &str) -> Option<u32> {
    match kind {
        "all" => Some(1),
        "alphabetic" => None,
        other => match other.parse::<u32>() {
            Ok(0) => None,
            Ok(step) => Some(step),
            Err(_) => Some(2),
        },
    }
}

/// `<ref> - <name>`, with the name falling back through [`NAME_TAGS`].
fn display_name(element: &MapElement) -> String {
    let name = NAME_TAGS.iter().find_map(|key| element.tag(key));
    match (element.tag("ref"), name) {
        (Some(reference), Some(name)) => format!("{reference} - {name}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => String::new(),
    }
}

fn node_point(element: &MapElement) -> Option<Point<f64>> {
    match element.data {
        ElementData::Node { lat, lon } => Some(Point::new(lon, lat)),
        _ => None,
    }
}

/// Collects addresses per subdivision and street.
pub struct StreetAssembler<'a> {
    rules: &'a CountryRules,
    principals: Vec<PrincipalBoundary>,
    streets: SpillCache<StreetKey, StreetDraft>,
    /// Street names per `(principal, route)`.
    names: BTreeMap<(usize, Vec<usize>), BTreeSet<String>>,
    work_dir: PathBuf,
    stats: IndexStats,
}

impl<'a> StreetAssembler<'a> {
    /// # Errors
    ///
    /// Returns an error if the spill directory cannot be created.
    pub async fn new(
        rules: &'a CountryRules,
        principals: Vec<PrincipalBoundary>,
        config: &IndexerConfig,
    ) -> Result<Self, IndexerError> {
        let spill_dir = config.work_dir.join(SPILL_DIR_NAME);
        tokio::fs::create_dir_all(&spill_dir).await?;

        Ok(Self {
            rules,
            principals,
            streets: SpillCache::new(spill_dir, config.street_cache_entries),
            names: BTreeMap::new(),
            work_dir: config.work_dir.clone(),
            stats: IndexStats::default(),
        })
    }

    fn skip(&mut self, reason: SkipReason, element: ElementRef) {
        log::warn!("Skipping {element}: {reason}");
        reason.count(&mut self.stats.skipped);
    }

    /// Streams every addressable element of the map into street drafts.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read or spilling fails.
    /// Individual unusable elements are skipped and counted.
    pub async fn index_places(
        &mut self,
        map: &dyn MapSource,
        progress: &dyn ProgressCallback,
    ) -> Result<(), IndexerError> {
        progress.set_total(map.size());
        progress.set_position(0);

        let mut offset = 0;
        loop {
            let segment = map.read_segment(offset).await?;
            if segment.size == 0 {
                break;
            }

            for element in &segment.elements {
                self.index_element(map, element).await?;
            }

            offset += segment.size;
            progress.set_position(offset);
        }

        log::info!(
            "Indexed {} addresses and {} interpolations ({} skipped, {} spills)",
            self.stats.addresses,
            self.stats.interpolations,
            self.stats.skipped.total(),
            self.streets.spills()
        );
        Ok(())
    }

    async fn index_element(&mut self, map: &dyn MapSource, element: &MapElement) -> Result<(), IndexerError> {
        if element.element.kind == ElementKind::Way
            && let Some(kind) = element.tag("addr:interpolation")
        {
            return self.index_interpolation(map, element, kind).await;
        }

        let (Some(raw_number), Some(street)) = (element.tag("addr:housenumber"), element.tag("addr:street")) else {
            return Ok(());
        };

        let Some(number) = self.rules.parse_house_number(raw_number) else {
            self.skip(SkipReason::HouseNumberUnparseable, element.element);
            return Ok(());
        };
        let Some(probe) = map
            .geometry(element.element)
            .await?
            .and_then(|g| Probe::from_geometry(&g))
        else {
            self.skip(SkipReason::GeometryMissing, element.element);
            return Ok(());
        };
        let Some(resolution) = find_leaf_subdivision(&self.principals, &probe) else {
            self.skip(SkipReason::SubdivisionUnresolved, element.element);
            return Ok(());
        };

        if element.has_tag("addr:flats") {
            log::warn!("{}: addr:flats is not supported, indexing without units", element.element);
        }

        let address = Address {
            element: element.element,
            name: display_name(element),
            unit: element.tag("addr:unit").unwrap_or_default().to_string(),
            number: number.number,
            suffix: number.suffix,
        };
        log::trace!("{} -> {} ({street})", element.element, resolution.path);

        self.add(resolution, street, |draft| draft.addresses.push(address)).await?;
        self.stats.addresses += 1;
        Ok(())
    }

    async fn index_interpolation(
        &mut self,
        map: &dyn MapSource,
        element: &MapElement,
        kind: &str,
    ) -> Result<(), IndexerError> {
        let Some(step) = interpolation_step(kind) else {
            self.skip(SkipReason::InterpolationUnsupported, element.element);
            return Ok(());
        };

        let nodes = element.way_nodes();
        let mut first = None;
        let mut numbers = Vec::new();
        for (i, &id) in nodes.iter().enumerate() {
            let Some(node) = map.element(ElementRef::node(id)).await? else {
                continue;
            };
            if let Some(number) = node
                .tag("addr:housenumber")
                .and_then(|raw| self.rules.parse_house_number(raw))
            {
                numbers.push(number.number);
            }
            if i == 0 {
                first = Some(node);
            }
        }

        let Some((street, point)) = first.as_ref().and_then(|node| {
            node.tag("addr:housenumber")?;
            Some((node.tag("addr:street")?.to_string(), node_point(node)?))
        }) else {
            self.skip(SkipReason::InterpolationWithoutAddresses, element.element);
            return Ok(());
        };
        let (Some(&start), Some(&end)) = (numbers.iter().min(), numbers.iter().max()) else {
            self.skip(SkipReason::InterpolationWithoutAddresses, element.element);
            return Ok(());
        };
        let Some(resolution) = find_leaf_subdivision(&self.principals, &Probe::Point(point)) else {
            self.skip(SkipReason::SubdivisionUnresolved, element.element);
            return Ok(());
        };

        let interpolation = Interpolation {
            way_id: element.element.id,
            start,
            end,
            step,
        };
        let nodes = nodes.to_vec();
        self.add(resolution, &street, |draft| {
            draft.interpolations.push(interpolation);
            draft.interpolated_nodes.extend(nodes);
        })
        .await?;
        self.stats.interpolations += 1;
        Ok(())
    }

    async fn add(
        &mut self,
        resolution: Resolution,
        street: &str,
        f: impl FnOnce(&mut StreetDraft),
    ) -> Result<(), IndexerError> {
        self.names
            .entry((resolution.principal, resolution.route.clone()))
            .or_default()
            .insert(street.to_string());

        let key = StreetKey {
            principal: resolution.principal,
            route: resolution.route,
            street: street.to_string(),
        };
        self.streets.update(key, f).await
    }

    /// Writes the street segment, then the container, and publishes it at
    /// `output`. The container is assembled under a `.tmp` name and only
    /// renamed into place once complete.
    ///
    /// # Errors
    ///
    /// Returns an error if reading spilled drafts or writing fails.
    pub async fn finalize(mut self, checksum: &Checksum, output: &Path) -> Result<IndexStats, IndexerError> {
        self.streets.wait_for_writes().await?;

        let segment_path = self.work_dir.join(SEGMENT_FILE_NAME);
        let tables = self.write_segment(&segment_path).await?;

        let trees: Vec<PrincipalTree> = self
            .principals
            .iter()
            .zip(&tables)
            .map(|(principal, tables)| PrincipalTree {
                code: principal.code.clone(),
                root: principal.root.to_subdivision(&mut Vec::new(), tables),
            })
            .collect();

        let tmp = tmp_path(output);
        if let Err(e) = write_container(&tmp, checksum, &trees, &segment_path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, output).await?;
        log::info!("Published {}", output.display());

        tokio::fs::remove_file(&segment_path).await?;
        if let Err(e) = tokio::fs::remove_dir_all(self.work_dir.join(SPILL_DIR_NAME)).await {
            log::warn!("Failed to remove spill directory: {e}");
        }

        let mut stats = self.stats;
        stats.principal_subdivisions = trees.len() as u64;
        stats.subdivisions = trees.iter().map(|t| t.root.node_count() as u64).sum();
        stats.container_size_bytes = tokio::fs::metadata(output).await?.len();
        Ok(stats)
    }

    /// Writes every street table and returns, per principal, the table
    /// reference of each subdivision route that has one.
    async fn write_segment(
        &mut self,
        path: &Path,
    ) -> Result<Vec<HashMap<Vec<usize>, StreetTableRef>>, IndexerError> {
        let file = tokio::fs::File::create(path).await?;
        let mut segment = StreetSegmentWriter::new(BufWriter::new(file));
        let mut tables = vec![HashMap::new(); self.principals.len()];
        let mut streets = 0_u64;

        for (principal, refs) in tables.iter_mut().enumerate() {
            let language = self
                .rules
                .boundary_rule(&self.principals[principal].code)
                .default_language;

            for route in self.principals[principal].root.routes() {
                let Some(names) = self.names.remove(&(principal, route.clone())) else {
                    continue;
                };

                let mut records = Vec::with_capacity(names.len());
                for street in names {
                    let key = StreetKey {
                        principal,
                        route: route.clone(),
                        street,
                    };
                    let Some(draft) = self.streets.take(&key).await? else {
                        continue;
                    };
                    if let Some(record) = draft.into_record(key.street, language) {
                        records.push(record);
                    }
                }
                if records.is_empty() {
                    continue;
                }

                streets += records.len() as u64;
                let table = group_streets(records, language);
                refs.insert(route, segment.append(&table).await?);
            }
        }

        let mut file = segment.finish().await?;
        file.shutdown().await?;
        self.stats.streets = streets;
        log::info!("Wrote {streets} streets to the street segment");
        Ok(tables)
    }
}

fn tmp_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_container(
    path: &Path,
    checksum: &Checksum,
    trees: &[PrincipalTree],
    segment_path: &Path,
) -> Result<(), IndexerError> {
    log::info!("Writing container to {}", path.display());

    let file = tokio::fs::File::create(path).await?;
    let mut writer = ContainerWriter::new(BufWriter::new(file), checksum).await?;
    for tree in trees {
        writer.write_principal(tree).await?;
    }
    writer.close_table().await?;

    let mut segment = tokio::fs::File::open(segment_path).await?;
    tokio::io::copy(&mut segment, writer.segment_writer()).await?;

    let out = writer.finish().await?;
    out.get_ref().sync_all().await?;
    Ok(())
}
