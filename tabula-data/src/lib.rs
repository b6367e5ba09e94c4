//! Adapters and pipelines that feed the Tabula transformation core.
//!
//! Responsibilities:
//! - Read OSM PBF extracts as a pull-based entity stream.
//! - Drive the bulk and diff pipelines into table sinks.
//! - Fetch augmented diffs over HTTP.
//! - Lay out table files and write the bounds and watermark sidecars.
//!
//! Boundaries:
//! - Row formatting, geometry and summary rules live in `tabula-core`.
//! - Argument parsing and process exit codes live in `tabula-cli`.

#![forbid(unsafe_code)]

pub mod artefacts;
pub mod bulk;
pub mod diff;
pub mod fetch;
pub mod pbf;

pub use artefacts::{
    ArtefactError, BulkLayout, ConvertError, ConvertOptions, DiffLayout, PollError, PollOptions,
    convert, epoch_seconds_now, poll, read_watermark, write_watermark,
};
pub use bulk::{BulkError, BulkReport, run_bulk};
pub use diff::{CreatedEntity, DiffDocument, DiffError, DiffReport, WatermarkKind, run_diff};
pub use fetch::{
    BoundingBox, BoundingBoxError, DEFAULT_BASE_URL, DiffSource, FetchError, HttpDiffSource,
    HttpDiffSourceConfig,
};
pub use pbf::{PbfEntitySource, PbfReadError};
