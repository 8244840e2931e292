//! OpenStreetMap PBF loader.
//!
//! Every primitive block of the file becomes one segment of the resulting
//! [`MemoryMapSource`]. The checksum is the SHA-512 digest of the file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};
use street_index_models::{CHECKSUM_LEN, Checksum, ElementKind, ElementRef};
use tokio::io::AsyncReadExt;

use crate::{ElementData, MapElement, MapError, MemoryMapBuilder, MemoryMapSource, RelationMember, Tags};

/// Loads an OSM PBF extract into memory.
///
/// Decoding runs on a blocking thread.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be read, or is not
/// a valid PBF file.
pub async fn load_pbf(path: impl AsRef<Path>) -> Result<MemoryMapSource, MapError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    if !path.exists() {
        return Err(MapError::FileNotFound(path.display().to_string()));
    }

    log::info!("Loading OSM PBF: {}", path.display());

    let checksum = file_checksum(&path).await?;
    log::debug!("Map checksum: {}", hex::encode(&checksum[..8]));

    let map = tokio::task::spawn_blocking(move || decode_blocks(&path, checksum)).await??;

    log::info!("Loaded {} map elements", map.len());
    Ok(map)
}

async fn file_checksum(path: &Path) -> Result<Checksum, MapError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0_u8; 1 << 20];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    let mut checksum = [0_u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&hasher.finalize());
    Ok(checksum)
}

fn decode_blocks(path: &Path, checksum: Checksum) -> Result<MemoryMapSource, MapError> {
    use osmpbf::{BlobDecode, BlobReader};

    let parse_error = |e: osmpbf::Error| MapError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let reader = BlobReader::from_path(path).map_err(parse_error)?;
    let mut builder = MemoryMapBuilder::default();
    let mut blocks = 0_u64;

    for blob in reader {
        let blob = blob.map_err(parse_error)?;
        let BlobDecode::OsmData(block) = blob.decode().map_err(parse_error)? else {
            continue;
        };

        for element in block.elements() {
            builder.push(convert(element));
        }
        builder.end_segment();

        blocks += 1;
        if blocks % 1000 == 0 {
            log::debug!("Decoded {blocks} blocks");
        }
    }

    Ok(builder.build(Some(checksum)))
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn convert(element: osmpbf::Element<'_>) -> MapElement {
    use osmpbf::{Element, RelMemberType};

    match element {
        Element::Node(node) => MapElement {
            element: ElementRef::node(node.id()),
            tags: collect_tags(node.tags()),
            data: ElementData::Node {
                lat: node.lat(),
                lon: node.lon(),
            },
        },
        Element::DenseNode(node) => MapElement {
            element: ElementRef::node(node.id()),
            tags: collect_tags(node.tags()),
            data: ElementData::Node {
                lat: node.lat(),
                lon: node.lon(),
            },
        },
        Element::Way(way) => MapElement {
            element: ElementRef::way(way.id()),
            tags: collect_tags(way.tags()),
            data: ElementData::Way {
                nodes: way.refs().collect(),
            },
        },
        Element::Relation(relation) => MapElement {
            element: ElementRef::relation(relation.id()),
            tags: collect_tags(relation.tags()),
            data: ElementData::Relation {
                members: relation
                    .members()
                    .map(|member| RelationMember {
                        element: ElementRef {
                            kind: match member.member_type {
                                RelMemberType::Node => ElementKind::Node,
                                RelMemberType::Way => ElementKind::Way,
                                RelMemberType::Relation => ElementKind::Relation,
                            },
                            id: member.member_id,
                        },
                        role: member.role().unwrap_or_default().to_string(),
                    })
                    .collect(),
            },
        },
    }
}
