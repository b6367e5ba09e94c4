//! Output artefacts on disk and the end-to-end `convert` and `poll` runs.
//!
//! Table files are created only for enabled tables. Sidecars (bounds and
//! watermark) are written after every table stream has been flushed, so a
//! failed run never advances the caller's resumption point.

use std::io;
use std::num::ParseIntError;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use tabula_core::{Schema, SinkError, Table, TableSelection, TableSinks, Watermark};
use thiserror::Error;

use crate::bulk::{BulkError, BulkReport, run_bulk};
use crate::diff::{DiffDocument, DiffError, DiffReport, WatermarkKind, run_diff};
use crate::fetch::{DiffSource, FetchError};
use crate::pbf::{PbfEntitySource, PbfReadError};

/// Errors raised while laying out or writing artefacts.
#[derive(Debug, Error)]
pub enum ArtefactError {
    /// The input path has no file name to derive table names from.
    #[error("input path {path} has no file name")]
    InputName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The output directory could not be created.
    #[error("failed to create output directory {path}")]
    CreateDir {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The watermark sidecar exists but could not be read.
    #[error("failed to read watermark from {path}")]
    ReadWatermark {
        /// Sidecar path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The watermark sidecar does not hold an integer.
    #[error("watermark file {path} does not hold an integer")]
    ParseWatermark {
        /// Sidecar path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: ParseIntError,
    },
    /// A bounds or watermark sidecar could not be written.
    #[error("failed to write {path}")]
    WriteSidecar {
        /// Sidecar path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// File names of a bulk conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLayout {
    dir: Utf8PathBuf,
    base: String,
}

impl BulkLayout {
    /// Layout for `input`, placed in `output_dir` or beside the input.
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use tabula_core::Table;
    /// use tabula_data::BulkLayout;
    ///
    /// let layout = BulkLayout::for_input(Utf8Path::new("data/berlin.osm.pbf"), None)?;
    /// assert_eq!(layout.table_path(Table::Members), "data/berlin-relations-members.csv");
    /// assert_eq!(layout.bounds_path(), "data/berlin-bounds.txt");
    /// # Ok::<(), tabula_data::ArtefactError>(())
    /// ```
    pub fn for_input(input: &Utf8Path, output_dir: Option<&Utf8Path>) -> Result<Self, ArtefactError> {
        let name = input.file_name().ok_or_else(|| ArtefactError::InputName {
            path: input.to_path_buf(),
        })?;
        let base = match name.strip_suffix(".osm.pbf") {
            Some(stem) if !stem.is_empty() => stem.to_owned(),
            _ => Utf8Path::new(name).file_stem().unwrap_or(name).to_owned(),
        };
        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input.parent().map(Utf8Path::to_path_buf).unwrap_or_default(),
        };
        Ok(Self { dir, base })
    }

    /// Directory holding every artefact.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path of the CSV file for `table`.
    #[must_use]
    pub fn table_path(&self, table: Table) -> Utf8PathBuf {
        let suffix = match table {
            Table::Members => "relations-members",
            other => other.name(),
        };
        self.dir.join(format!("{}-{suffix}.csv", self.base))
    }

    /// Path of the bounds sidecar.
    #[must_use]
    pub fn bounds_path(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}-bounds.txt", self.base))
    }
}

/// File names of one diff run, stamped with the run's start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLayout {
    dir: Utf8PathBuf,
    epoch_seconds: u64,
}

impl DiffLayout {
    /// Layout in `dir` stamped with `epoch_seconds`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>, epoch_seconds: u64) -> Self {
        Self {
            dir: dir.into(),
            epoch_seconds,
        }
    }

    /// Path of the CSV file for `table`, e.g. `ways_1700000000.csv`.
    #[must_use]
    pub fn table_path(&self, table: Table) -> Utf8PathBuf {
        self.dir
            .join(format!("{}_{}.csv", table.name(), self.epoch_seconds))
    }
}

/// Seconds since the Unix epoch, or 0 if the clock is before it.
#[must_use]
pub fn epoch_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn ensure_dir(dir: &Utf8Path) -> Result<(), ArtefactError> {
    tabula_fs::ensure_dir(dir).map_err(|source| ArtefactError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn write_sidecar(path: &Utf8Path, contents: &str) -> Result<(), ArtefactError> {
    tabula_fs::write_text(path, contents).map_err(|source| ArtefactError::WriteSidecar {
        path: path.to_path_buf(),
        source,
    })?;
    info!("wrote {path}");
    Ok(())
}

/// Persist `watermark` as its bare decimal value.
pub fn write_watermark(path: &Utf8Path, watermark: Watermark) -> Result<(), ArtefactError> {
    write_sidecar(path, &watermark.to_string())
}

/// Load the watermark persisted at `path`, or `None` if there is no file.
///
/// Surrounding whitespace is ignored.
pub fn read_watermark(path: &Utf8Path) -> Result<Option<Watermark>, ArtefactError> {
    let contents = match tabula_fs::read_text(path) {
        Ok(contents) => contents,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ArtefactError::ReadWatermark {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    contents
        .parse()
        .map(Some)
        .map_err(|source| ArtefactError::ParseWatermark {
            path: path.to_path_buf(),
            source,
        })
}

/// Settings of a bulk conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// PBF extract to read.
    pub input: Utf8PathBuf,
    /// Directory for the tables and bounds sidecar; defaults to the input's.
    pub output_dir: Option<Utf8PathBuf>,
    /// Where to write the watermark, if anywhere.
    pub watermark_path: Option<Utf8PathBuf>,
    /// Tables to emit.
    pub tables: TableSelection,
}

/// Errors that abort a bulk conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The extract could not be opened.
    #[error(transparent)]
    Read(#[from] PbfReadError),
    /// The pipeline failed.
    #[error(transparent)]
    Bulk(#[from] BulkError),
    /// A table stream could not be created or flushed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// A directory or sidecar could not be written.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),
}

/// Convert a PBF extract into CSV tables plus sidecars.
pub fn convert(options: &ConvertOptions) -> Result<BulkReport, ConvertError> {
    let layout = BulkLayout::for_input(&options.input, options.output_dir.as_deref())?;
    let source = PbfEntitySource::open(options.input.as_std_path())?;
    ensure_dir(layout.dir())?;
    let mut sinks = TableSinks::open(options.tables, Schema::Bulk, |table| {
        tabula_fs::create_file(&layout.table_path(table))
    })?;
    let report = run_bulk(source, &mut sinks)?;
    for output in sinks.finish()? {
        info!(
            "wrote {} rows to {}",
            output.rows,
            layout.table_path(output.table)
        );
    }
    write_sidecar(&layout.bounds_path(), &report.summary.bounds().to_sidecar())?;
    if let Some(path) = &options.watermark_path {
        write_watermark(path, report.summary.watermark())?;
    }
    Ok(report)
}

/// Settings of one incremental poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Directory for the tables.
    pub output_dir: Utf8PathBuf,
    /// Watermark of the previous run; selects the diff to fetch.
    pub watermark: Watermark,
    /// Where to write the new watermark, if anywhere.
    pub watermark_path: Option<Utf8PathBuf>,
    /// Quantity tracked as the watermark.
    pub watermark_kind: WatermarkKind,
    /// Tables to emit.
    pub tables: TableSelection,
    /// Timestamp used in table file names.
    pub epoch_seconds: u64,
}

/// Errors that abort a poll.
#[derive(Debug, Error)]
pub enum PollError {
    /// The diff could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The diff could not be parsed or written.
    #[error(transparent)]
    Diff(#[from] DiffError),
    /// A table stream could not be created or flushed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// A directory or sidecar could not be written.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),
}

/// Fetch the diff after `options.watermark` and write its create actions.
///
/// Fetch and parse failures happen before any file is created.
pub fn poll<S>(source: &S, options: &PollOptions) -> Result<DiffReport, PollError>
where
    S: DiffSource + ?Sized,
{
    let xml = source.fetch(options.watermark)?;
    let document = DiffDocument::parse(&xml)?;
    ensure_dir(&options.output_dir)?;
    let layout = DiffLayout::new(options.output_dir.clone(), options.epoch_seconds);
    let mut sinks = TableSinks::open(options.tables, Schema::Diff, |table| {
        tabula_fs::create_file(&layout.table_path(table))
    })?;
    let report = run_diff(
        &document,
        &mut sinks,
        options.watermark,
        options.watermark_kind,
    )?;
    for output in sinks.finish()? {
        info!(
            "wrote {} rows to {}",
            output.rows,
            layout.table_path(output.table)
        );
    }
    if let Some(path) = &options.watermark_path {
        write_watermark(path, report.watermark)?;
    }
    Ok(report)
}
