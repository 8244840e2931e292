//! A map held entirely in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use geo::{Coord, Geometry, LineString};
use sha2::{Digest, Sha512};
use street_index_models::{CHECKSUM_LEN, Checksum, ElementKind, ElementRef};

use crate::geometry::{assemble_multipolygon, join_rings, way_shape};
use crate::{ElementData, MapElement, MapError, MapSource, RelationMember, Segment, Tags};

/// Builds a [`MemoryMapSource`] element by element.
///
/// Elements are kept in insertion order. [`MemoryMapBuilder::end_segment`]
/// closes the current segment; without it everything is one segment.
#[derive(Debug, Default)]
pub struct MemoryMapBuilder {
    elements: Vec<MapElement>,
    segment_starts: Vec<usize>,
    segment_open: bool,
}

fn to_tags(tags: &[(&str, &str)]) -> Tags {
    tags.iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

impl MemoryMapBuilder {
    pub fn push(&mut self, element: MapElement) -> &mut Self {
        if !self.segment_open {
            self.segment_starts.push(self.elements.len());
            self.segment_open = true;
        }
        self.elements.push(element);
        self
    }

    pub fn end_segment(&mut self) -> &mut Self {
        self.segment_open = false;
        self
    }

    pub fn node(&mut self, id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> &mut Self {
        self.push(MapElement {
            element: ElementRef::node(id),
            tags: to_tags(tags),
            data: ElementData::Node { lat, lon },
        })
    }

    pub fn way(&mut self, id: i64, nodes: &[i64], tags: &[(&str, &str)]) -> &mut Self {
        self.push(MapElement {
            element: ElementRef::way(id),
            tags: to_tags(tags),
            data: ElementData::Way {
                nodes: nodes.to_vec(),
            },
        })
    }

    pub fn relation(
        &mut self,
        id: i64,
        members: &[(ElementRef, &str)],
        tags: &[(&str, &str)],
    ) -> &mut Self {
        self.push(MapElement {
            element: ElementRef::relation(id),
            tags: to_tags(tags),
            data: ElementData::Relation {
                members: members
                    .iter()
                    .map(|(element, role)| RelationMember {
                        element: *element,
                        role: (*role).to_string(),
                    })
                    .collect(),
            },
        })
    }

    /// Finishes the map. Without an explicit checksum one is derived from
    /// the element contents.
    #[must_use]
    pub fn build(self, checksum: Option<Checksum>) -> MemoryMapSource {
        let checksum = checksum.unwrap_or_else(|| content_checksum(&self.elements));
        let index = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.element, i))
            .collect();

        MemoryMapSource {
            elements: self.elements,
            index,
            segment_starts: self.segment_starts,
            checksum,
        }
    }
}

fn content_checksum(elements: &[MapElement]) -> Checksum {
    let mut hasher = Sha512::new();
    for element in elements {
        hasher.update([element.element.kind as u8]);
        hasher.update(element.element.id.to_le_bytes());
        for (key, value) in &element.tags {
            hasher.update(key.as_bytes());
            hasher.update([0]);
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
        match &element.data {
            ElementData::Node { lat, lon } => {
                hasher.update(lat.to_le_bytes());
                hasher.update(lon.to_le_bytes());
            }
            ElementData::Way { nodes } => {
                for node in nodes {
                    hasher.update(node.to_le_bytes());
                }
            }
            ElementData::Relation { members } => {
                for member in members {
                    hasher.update([member.element.kind as u8]);
                    hasher.update(member.element.id.to_le_bytes());
                    hasher.update(member.role.as_bytes());
                    hasher.update([0]);
                }
            }
        }
    }
    let mut checksum = [0_u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&hasher.finalize());
    checksum
}

/// An in-memory [`MapSource`]. Offsets and sizes count elements.
#[derive(Debug)]
pub struct MemoryMapSource {
    elements: Vec<MapElement>,
    index: HashMap<ElementRef, usize>,
    segment_starts: Vec<usize>,
    checksum: Checksum,
}

impl MemoryMapSource {
    #[must_use]
    pub fn builder() -> MemoryMapBuilder {
        MemoryMapBuilder::default()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn get(&self, element: ElementRef) -> Option<&MapElement> {
        self.index.get(&element).map(|&i| &self.elements[i])
    }

    fn node_coords(&self, nodes: &[i64]) -> Option<Vec<Coord<f64>>> {
        nodes
            .iter()
            .map(|&id| match self.get(ElementRef::node(id))?.data {
                ElementData::Node { lat, lon } => Some(Coord { x: lon, y: lat }),
                _ => None,
            })
            .collect()
    }

    fn ring_lines(&self, chains: Vec<Vec<i64>>) -> Vec<LineString<f64>> {
        join_rings(chains)
            .into_iter()
            .filter_map(|ring| self.node_coords(&ring))
            .map(LineString::new)
            .collect()
    }

    fn relation_shape(&self, element: &MapElement, members: &[RelationMember]) -> Option<Geometry<f64>> {
        let kind = element.tag("type");
        if !matches!(kind, Some("multipolygon" | "boundary")) {
            return None;
        }

        let mut outer = Vec::new();
        let mut inner = Vec::new();
        for member in members.iter().filter(|m| m.element.kind == ElementKind::Way) {
            let Some(way) = self.get(member.element) else {
                continue;
            };
            match member.role.as_str() {
                "inner" => inner.push(way.way_nodes().to_vec()),
                "outer" | "" => outer.push(way.way_nodes().to_vec()),
                _ => {}
            }
        }

        let shape = assemble_multipolygon(self.ring_lines(outer), self.ring_lines(inner));
        if shape.0.is_empty() {
            None
        } else {
            Some(Geometry::MultiPolygon(shape))
        }
    }

    fn shape(&self, element: &MapElement) -> Option<Geometry<f64>> {
        match &element.data {
            ElementData::Node { lat, lon } => Some(Geometry::Point(geo::Point::new(*lon, *lat))),
            ElementData::Way { nodes } => way_shape(self.node_coords(nodes)?),
            ElementData::Relation { members } => self.relation_shape(element, members),
        }
    }
}

#[async_trait]
impl MapSource for MemoryMapSource {
    fn size(&self) -> u64 {
        self.elements.len() as u64
    }

    async fn read_segment(&self, offset: u64) -> Result<Segment, MapError> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(Segment::default());
        };
        if start >= self.elements.len() {
            return Ok(Segment::default());
        }

        let next = self.segment_starts.partition_point(|&s| s <= start);
        let end = self
            .segment_starts
            .get(next)
            .copied()
            .unwrap_or(self.elements.len());

        Ok(Segment {
            elements: self.elements[start..end].to_vec(),
            size: (end - start) as u64,
        })
    }

    async fn element(&self, element: ElementRef) -> Result<Option<MapElement>, MapError> {
        Ok(self.get(element).cloned())
    }

    async fn geometry(&self, element: ElementRef) -> Result<Option<Geometry<f64>>, MapError> {
        Ok(self.get(element).and_then(|e| self.shape(e)))
    }

    async fn checksum(&self) -> Result<Checksum, MapError> {
        Ok(self.checksum)
    }
}
