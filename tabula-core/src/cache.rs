//! Node coordinate cache used to resolve way geometries during a bulk run.
//!
//! Entries are stored inline in an open-addressing map keyed by the raw OSM
//! node id, so each cached node costs one `(i64, Coord<f64>)` slot and no
//! separate heap allocation.

use geo::Coord;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// A way referenced a node that has not been observed yet.
///
/// In a correctly ordered stream every node precedes the ways that use it, so
/// a miss means the upstream source violated that ordering.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("way {way_id} references node {node_id}, which has not been observed")]
pub struct MissingNode {
    /// Way whose geometry was being resolved.
    pub way_id: i64,
    /// First node reference that could not be resolved.
    pub node_id: i64,
}

/// Mapping from node id to the last coordinate observed for it.
#[derive(Debug, Default)]
pub struct NodeCoordinateCache {
    coordinates: FxHashMap<i64, Coord<f64>>,
}

impl NodeCoordinateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache sized for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            coordinates: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Record (or overwrite) the coordinate of `node_id`.
    pub fn put(&mut self, node_id: i64, coordinate: Coord<f64>) {
        self.coordinates.insert(node_id, coordinate);
    }

    /// Look up the coordinate of `node_id`.
    #[must_use]
    pub fn get(&self, node_id: i64) -> Option<Coord<f64>> {
        self.coordinates.get(&node_id).copied()
    }

    /// Number of cached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Whether no node has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Resolve every node reference of `way_id`, in order.
    ///
    /// Fails on the first reference missing from the cache; no point is ever
    /// silently dropped.
    pub fn resolve(&self, way_id: i64, node_refs: &[i64]) -> Result<Vec<Coord<f64>>, MissingNode> {
        node_refs
            .iter()
            .map(|&node_id| self.get(node_id).ok_or(MissingNode { way_id, node_id }))
            .collect()
    }
}
