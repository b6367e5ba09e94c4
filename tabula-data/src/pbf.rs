//! Pull-based entity source over an OSM PBF extract.
//!
//! Blobs are read and decoded one at a time; the elements of each primitive
//! block are converted to owned [`OsmEntity`] values and handed out in file
//! order, so callers see nodes, ways and relations exactly as the extract
//! stores them.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo::Coord;
use log::debug;
use osmpbf::{BlobDecode, BlobReader, Element, PrimitiveBlock, RelMemberType};
use tabula_core::{
    EntityKind, EntityMeta, OsmEntity, OsmNode, OsmRelation, OsmWay, RelationMember, Tags,
};
use thiserror::Error;

/// Errors raised while reading a PBF extract.
#[derive(Debug, Error)]
pub enum PbfReadError {
    /// The extract could not be opened.
    #[error("failed to open OSM PBF file at {path:?}")]
    Open {
        /// Underlying decoder error.
        #[source]
        source: osmpbf::Error,
        /// Path of the extract.
        path: PathBuf,
    },
    /// A blob or element could not be decoded.
    #[error("failed to decode OSM PBF data at {path:?}")]
    Decode {
        /// Underlying decoder error.
        #[source]
        source: osmpbf::Error,
        /// Path of the extract.
        path: PathBuf,
    },
}

/// Lazy, forward-only sequence of entities read from a PBF extract.
///
/// Iteration stops after the first decode error.
///
/// # Examples
/// ```no_run
/// use std::path::Path;
/// use tabula_data::PbfEntitySource;
///
/// # fn main() -> Result<(), tabula_data::PbfReadError> {
/// let mut nodes = 0;
/// for entity in PbfEntitySource::open(Path::new("region.osm.pbf"))? {
///     if matches!(entity?, tabula_core::OsmEntity::Node(_)) {
///         nodes += 1;
///     }
/// }
/// println!("{nodes} nodes");
/// # Ok(())
/// # }
/// ```
pub struct PbfEntitySource {
    path: PathBuf,
    blobs: BlobReader<BufReader<File>>,
    pending: VecDeque<OsmEntity>,
    exhausted: bool,
}

impl std::fmt::Debug for PbfEntitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PbfEntitySource")
            .field("path", &self.path)
            .field("pending", &self.pending.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl PbfEntitySource {
    /// Open the extract at `path`.
    pub fn open(path: &Path) -> Result<Self, PbfReadError> {
        let blobs = BlobReader::from_path(path).map_err(|source| PbfReadError::Open {
            source,
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            blobs,
            pending: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Path of the extract being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode_error(&mut self, source: osmpbf::Error) -> PbfReadError {
        self.exhausted = true;
        self.pending.clear();
        PbfReadError::Decode {
            source,
            path: self.path.clone(),
        }
    }

    fn buffer_block(&mut self, block: &PrimitiveBlock) -> Result<(), osmpbf::Error> {
        for element in block.elements() {
            self.pending.push_back(owned_entity(element)?);
        }
        Ok(())
    }
}

impl Iterator for PbfEntitySource {
    type Item = Result<OsmEntity, PbfReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(Ok(entity));
            }
            if self.exhausted {
                return None;
            }
            let blob = match self.blobs.next() {
                Some(Ok(blob)) => blob,
                Some(Err(source)) => return Some(Err(self.decode_error(source))),
                None => {
                    self.exhausted = true;
                    return None;
                }
            };
            let buffered = match blob.decode() {
                Ok(BlobDecode::OsmData(block)) => self.buffer_block(&block),
                Ok(BlobDecode::OsmHeader(_)) => Ok(()),
                Ok(BlobDecode::Unknown(kind)) => {
                    debug!("skipping unknown blob type {kind} in {:?}", self.path);
                    Ok(())
                }
                Err(source) => Err(source),
            };
            if let Err(source) = buffered {
                return Some(Err(self.decode_error(source)));
            }
        }
    }
}

fn owned_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn owned_meta(id: i64, info: &osmpbf::Info<'_>) -> Result<EntityMeta, osmpbf::Error> {
    Ok(EntityMeta {
        id,
        version: info.version(),
        changeset: info.changeset(),
        username: info.user().transpose()?.map(str::to_owned),
        uid: info.uid(),
        timestamp_millis: info.milli_timestamp(),
    })
}

const fn member_kind(member_type: &RelMemberType) -> EntityKind {
    match member_type {
        RelMemberType::Node => EntityKind::Node,
        RelMemberType::Way => EntityKind::Way,
        RelMemberType::Relation => EntityKind::Relation,
    }
}

fn owned_entity(element: Element<'_>) -> Result<OsmEntity, osmpbf::Error> {
    match element {
        Element::Node(node) => Ok(OsmEntity::Node(OsmNode {
            meta: owned_meta(node.id(), &node.info())?,
            tags: owned_tags(node.tags()),
            coordinate: Coord {
                x: node.lon(),
                y: node.lat(),
            },
        })),
        Element::DenseNode(node) => {
            let meta = match node.info() {
                Some(info) => EntityMeta {
                    id: node.id(),
                    version: Some(info.version()),
                    changeset: Some(info.changeset()),
                    username: Some(info.user()?.to_owned()),
                    uid: Some(info.uid()),
                    timestamp_millis: Some(info.milli_timestamp()),
                },
                None => EntityMeta::new(node.id()),
            };
            Ok(OsmEntity::Node(OsmNode {
                meta,
                tags: owned_tags(node.tags()),
                coordinate: Coord {
                    x: node.lon(),
                    y: node.lat(),
                },
            }))
        }
        Element::Way(way) => Ok(OsmEntity::Way(OsmWay {
            meta: owned_meta(way.id(), &way.info())?,
            tags: owned_tags(way.tags()),
            node_refs: way.refs().collect(),
        })),
        Element::Relation(relation) => {
            let members = relation
                .members()
                .map(|member| {
                    let role = member.role()?.to_owned();
                    Ok(RelationMember {
                        member_id: member.member_id,
                        member_type: member_kind(&member.member_type),
                        role,
                    })
                })
                .collect::<Result<Vec<_>, osmpbf::Error>>()?;
            Ok(OsmEntity::Relation(OsmRelation {
                meta: owned_meta(relation.id(), &relation.info())?,
                tags: owned_tags(relation.tags()),
                members,
            }))
        }
    }
}
