#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map element sources for the street address index.
//!
//! The indexer and the reader never touch a map file directly. They go
//! through [`MapSource`], which streams elements in segments, looks up
//! single elements by reference, builds element geometry and reports the
//! checksum an address container is bound to.
//!
//! [`MemoryMapSource`] holds a whole map in memory and is what
//! [`load_pbf`] produces for `.osm.pbf` extracts.

pub mod geometry;
mod memory;
mod pbf;

use std::collections::BTreeMap;

use async_trait::async_trait;
use geo::Geometry;
use street_index_models::{Checksum, ElementRef};

pub use memory::{MemoryMapBuilder, MemoryMapSource};
pub use pbf::load_pbf;

/// Errors that can occur while reading a map.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The map file does not exist.
    #[error("Map file not found: {0}")]
    FileNotFound(String),

    /// The map file could not be decoded.
    #[error("Failed to parse map {path}: {message}")]
    Parse { path: String, message: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking loader task panicked or was cancelled.
    #[error("Map loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Tag map of an element.
pub type Tags = BTreeMap<String, String>;

/// A member of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    pub element: ElementRef,
    pub role: String,
}

/// Kind-specific payload of a map element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementData {
    Node { lat: f64, lon: f64 },
    Way { nodes: Vec<i64> },
    Relation { members: Vec<RelationMember> },
}

/// A single map element.
#[derive(Debug, Clone, PartialEq)]
pub struct MapElement {
    pub element: ElementRef,
    pub tags: Tags,
    pub data: ElementData,
}

impl MapElement {
    /// Trimmed, non-empty tag value.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn has_tag(&self, key: &str) -> bool {
        self.tag(key).is_some()
    }

    /// Node ids of a way; empty for other kinds.
    #[must_use]
    pub fn way_nodes(&self) -> &[i64] {
        match &self.data {
            ElementData::Way { nodes } => nodes,
            _ => &[],
        }
    }
}

/// A run of consecutive elements read from a map.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub elements: Vec<MapElement>,
    /// Size of the segment in the same unit as [`MapSource::size`]. Zero
    /// marks the end of the map.
    pub size: u64,
}

/// Random and sequential access to a map.
///
/// Offsets and sizes are opaque to callers: start at `0`, then advance by
/// [`Segment::size`] until it reaches [`MapSource::size`].
#[async_trait]
pub trait MapSource: Send + Sync {
    /// Total size of the map.
    fn size(&self) -> u64;

    /// Reads the segment starting at `offset`.
    async fn read_segment(&self, offset: u64) -> Result<Segment, MapError>;

    /// Looks up a single element.
    async fn element(&self, element: ElementRef) -> Result<Option<MapElement>, MapError>;

    /// Builds the geometry of an element. Nodes are points, ways are line
    /// strings or polygons, area relations are multipolygons.
    async fn geometry(&self, element: ElementRef) -> Result<Option<Geometry<f64>>, MapError>;

    /// Checksum identifying the map contents.
    async fn checksum(&self) -> Result<Checksum, MapError>;
}
