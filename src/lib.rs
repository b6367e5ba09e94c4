//! Facade crate for the Tabula OSM-to-CSV converter.
//!
//! This crate re-exports the transformation core and, behind the `data`
//! feature, the PBF reader, the bulk and diff pipelines and the artefact
//! writers.

#![forbid(unsafe_code)]

pub use tabula_core::{
    Bounds, EntityKind, EntityMeta, Field, GeometryError, MissingNode, NodeCoordinateCache,
    OsmEntity, OsmNode, OsmRelation, OsmWay, RelationMember, RowCounts, Schema, SinkError,
    SummaryTracker, Table, TableSelection, TableSinks, Watermark, build_wkt,
};

#[cfg(feature = "data")]
pub use tabula_data::{
    BoundingBox, BulkReport, ConvertError, ConvertOptions, DiffReport, DiffSource, FetchError,
    HttpDiffSource, PollError, PollOptions, WatermarkKind, convert, poll,
};
