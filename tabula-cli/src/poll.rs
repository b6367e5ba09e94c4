//! Poll command implementation for the Tabula CLI.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tabula_core::{TableSelection, Watermark};
use tabula_data::{
    BoundingBox, DEFAULT_BASE_URL, DiffReport, DiffSource, HttpDiffSource, HttpDiffSourceConfig,
    PollOptions, WatermarkKind, epoch_seconds_now, poll, read_watermark,
};

use crate::{
    ARG_BASE_URL, ARG_MAX_LAT, ARG_MAX_LON, ARG_MIN_LAT, ARG_MIN_LON, ARG_OUTPUT_DIR,
    ARG_WATERMARK, ARG_WATERMARK_KIND, ARG_WATERMARK_PATH, CliError, ENV_POLL_OUTPUT_DIR,
    table_selection,
};

/// CLI arguments for the `poll` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "poll",
    long_about = "Request the augmented diff that follows the previous \
                 watermark, keep only its create actions and write them as \
                 timestamped CSV tables. Without --watermark the previous \
                 value is read from --watermark-path. A timestamp watermark \
                 is stored as epoch milliseconds, which augmented diff \
                 endpoints do not accept as a diff id, so polls using \
                 --watermark-kind timestamp need an explicit --watermark.",
    about = "Write the entities created by the next augmented diff"
)]
#[ortho_config(prefix = "TABULA")]
pub(crate) struct PollArgs {
    /// Directory for the timestamped tables.
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Watermark of the previous run.
    #[arg(long = ARG_WATERMARK, value_name = "value", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) watermark: Option<i64>,
    /// File holding the watermark; read when --watermark is absent and
    /// rewritten after a successful run.
    #[arg(long = ARG_WATERMARK_PATH, value_name = "path")]
    #[serde(default)]
    pub(crate) watermark_path: Option<Utf8PathBuf>,
    /// Quantity tracked as the watermark: changeset or timestamp.
    #[arg(long = ARG_WATERMARK_KIND, value_name = "kind")]
    #[serde(default)]
    pub(crate) watermark_kind: Option<WatermarkKind>,
    /// Augmented diff endpoint.
    #[arg(long = ARG_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, value_name = "secs")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// Western edge of the bounding box filter.
    #[arg(long = ARG_MIN_LON, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) min_lon: Option<f64>,
    /// Southern edge of the bounding box filter.
    #[arg(long = ARG_MIN_LAT, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) min_lat: Option<f64>,
    /// Eastern edge of the bounding box filter.
    #[arg(long = ARG_MAX_LON, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) max_lon: Option<f64>,
    /// Northern edge of the bounding box filter.
    #[arg(long = ARG_MAX_LAT, value_name = "deg", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) max_lat: Option<f64>,
    /// Emit the tags table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) tags: Option<bool>,
    /// Emit the nodes table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) nodes: Option<bool>,
    /// Emit the ways table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) ways: Option<bool>,
    /// Emit the relations table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) relations: Option<bool>,
    /// Emit the relation members table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) members: Option<bool>,
}

impl PollArgs {
    pub(crate) fn into_config(self) -> Result<PollConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        PollConfig::try_from(merged)
    }
}

/// Resolved `poll` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PollConfig {
    pub(crate) output_dir: Utf8PathBuf,
    /// Explicit previous watermark; `None` defers to `watermark_path`.
    pub(crate) watermark: Option<Watermark>,
    pub(crate) watermark_path: Option<Utf8PathBuf>,
    pub(crate) watermark_kind: WatermarkKind,
    pub(crate) base_url: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) bbox: Option<BoundingBox>,
    pub(crate) tables: TableSelection,
}

impl PollConfig {
    /// The watermark to resume from: explicit value, then the watermark
    /// file, then 0.
    pub(crate) fn previous_watermark(&self) -> Result<Watermark, CliError> {
        if let Some(watermark) = self.watermark {
            return Ok(watermark);
        }
        let Some(path) = &self.watermark_path else {
            return Ok(Watermark::default());
        };
        Ok(read_watermark(path)?.unwrap_or_default())
    }

    /// Warning for a watermark kind the endpoint cannot resume from.
    pub(crate) fn watermark_caveat(&self) -> Option<&'static str> {
        match self.watermark_kind {
            WatermarkKind::Timestamp => Some(
                "timestamp watermarks are epoch milliseconds, not diff ids; \
                 pass --watermark explicitly on the next poll",
            ),
            WatermarkKind::Changeset => None,
        }
    }

    pub(crate) fn source_config(&self) -> HttpDiffSourceConfig {
        let mut config = HttpDiffSourceConfig::new(self.base_url.clone());
        if let Some(bbox) = self.bbox {
            config = config.with_bbox(bbox);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    pub(crate) fn poll_options(&self, watermark: Watermark, epoch_seconds: u64) -> PollOptions {
        PollOptions {
            output_dir: self.output_dir.clone(),
            watermark,
            watermark_path: self.watermark_path.clone(),
            watermark_kind: self.watermark_kind,
            tables: self.tables,
            epoch_seconds,
        }
    }
}

impl TryFrom<PollArgs> for PollConfig {
    type Error = CliError;

    fn try_from(args: PollArgs) -> Result<Self, Self::Error> {
        let output_dir = args.output_dir.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT_DIR,
            env: ENV_POLL_OUTPUT_DIR,
        })?;
        let bbox = match (args.min_lon, args.min_lat, args.max_lon, args.max_lat) {
            (None, None, None, None) => None,
            (Some(min_lon), Some(min_lat), Some(max_lon), Some(max_lat)) => {
                Some(BoundingBox::new(min_lon, min_lat, max_lon, max_lat)?)
            }
            _ => return Err(CliError::IncompleteBoundingBox),
        };
        Ok(Self {
            output_dir,
            watermark: args.watermark.map(Watermark::new),
            watermark_path: args.watermark_path,
            watermark_kind: args.watermark_kind.unwrap_or_default(),
            base_url: args
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            timeout: args.timeout_secs.map(Duration::from_secs),
            bbox,
            tables: table_selection(
                args.tags,
                args.nodes,
                args.ways,
                args.relations,
                args.members,
            ),
        })
    }
}

/// Builds the diff source for the current poll invocation.
pub(super) trait DiffSourceBuilder {
    fn build(&self, config: &PollConfig) -> Result<Box<dyn DiffSource>, CliError>;
}

pub(super) struct HttpDiffSourceBuilder;

impl DiffSourceBuilder for HttpDiffSourceBuilder {
    fn build(&self, config: &PollConfig) -> Result<Box<dyn DiffSource>, CliError> {
        let source = HttpDiffSource::with_config(config.source_config()).map_err(|source| {
            CliError::BuildDiffSource {
                base_url: config.base_url.clone(),
                source,
            }
        })?;
        Ok(Box::new(source))
    }
}

pub(super) fn run_poll(args: PollArgs) -> Result<(), CliError> {
    run_poll_with(args, &HttpDiffSourceBuilder, epoch_seconds_now())?;
    Ok(())
}

pub(super) fn run_poll_with(
    args: PollArgs,
    builder: &dyn DiffSourceBuilder,
    epoch_seconds: u64,
) -> Result<DiffReport, CliError> {
    let config = args.into_config()?;
    execute_poll(&config, builder, epoch_seconds)
}

pub(super) fn execute_poll(
    config: &PollConfig,
    builder: &dyn DiffSourceBuilder,
    epoch_seconds: u64,
) -> Result<DiffReport, CliError> {
    if let Some(caveat) = config.watermark_caveat() {
        warn!("{caveat}");
    }
    let watermark = config.previous_watermark()?;
    let source = builder.build(config)?;
    let report = poll(source.as_ref(), &config.poll_options(watermark, epoch_seconds))?;
    info!("polled from watermark {watermark} to {}", report.watermark);
    Ok(report)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<PollConfig, CliError> {
    let merged = PollArgs::merge_from_layers(layers).map_err(CliError::from)?;
    PollConfig::try_from(merged)
}
