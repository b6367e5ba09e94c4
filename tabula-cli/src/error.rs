//! Error types emitted by the Tabula CLI.
//!
//! Messages name the failing step only; `main` prints the `source` chain
//! underneath.

use std::sync::Arc;

use camino::Utf8PathBuf;
use tabula_data::{ArtefactError, BoundingBoxError, ConvertError, FetchError, PollError};
use thiserror::Error;

/// Errors emitted by the Tabula CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Only some edges of the bounding box filter were given.
    #[error("bounding box needs all of --min-lon, --min-lat, --max-lon and --max-lat")]
    IncompleteBoundingBox,
    /// The bounding box filter is not a valid box.
    #[error("invalid bounding box")]
    InvalidBoundingBox(#[from] BoundingBoxError),
    /// The previous watermark could not be loaded.
    #[error(transparent)]
    LoadWatermark(#[from] ArtefactError),
    /// Constructing the diff source failed.
    #[error("failed to build diff source for {base_url:?}")]
    BuildDiffSource {
        base_url: String,
        #[source]
        source: FetchError,
    },
    /// The diff server asked us to back off.
    #[error("rate limited by {url}; wait before polling again")]
    RateLimited { url: String },
    /// The bulk conversion failed.
    #[error("conversion failed")]
    Convert(#[from] ConvertError),
    /// The incremental poll failed.
    #[error("poll failed")]
    Poll(#[source] PollError),
}

impl From<PollError> for CliError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Fetch(FetchError::RateLimited { url }) => Self::RateLimited { url },
            other => Self::Poll(other),
        }
    }
}
