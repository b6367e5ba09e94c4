//! Entity-to-relational transformation core for Tabula.
//!
//! Responsibilities:
//! - Model OSM entities as owned values.
//! - Synthesise WKT geometries from ordered coordinates.
//! - Cache node coordinates for way resolution.
//! - Extract table rows and stream them to CSV sinks.
//! - Track bounds and the ingestion watermark.
//!
//! Boundaries:
//! - No filesystem or network access; callers supply writers.
//! - No decoding of PBF or XML (lives in `tabula-data`).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cache;
pub mod entity;
pub mod geometry;
pub mod rows;
pub mod sink;
pub mod summary;
pub mod table;

pub use cache::{MissingNode, NodeCoordinateCache};
pub use entity::{
    EntityKind, EntityMeta, OsmEntity, OsmNode, OsmRelation, OsmWay, RelationMember, Tags,
};
pub use geometry::{GeometryError, MIN_RING_POINTS, build_wkt};
pub use sink::{SinkError, TableOutput, TableSinks, TableWriter};
pub use summary::{Bounds, SummaryTracker, Watermark};
pub use table::{Field, Row, RowCounts, Schema, Table, TableSelection};
