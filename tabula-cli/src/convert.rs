//! Convert command implementation for the Tabula CLI.

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use tabula_data::{BulkReport, ConvertOptions, convert};

use crate::{
    ARG_INPUT, ARG_OUTPUT_DIR, ARG_WATERMARK_PATH, CliError, ENV_CONVERT_INPUT, require_existing,
    table_selection,
};

/// CLI arguments for the `convert` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "convert",
    long_about = "Stream a PBF extract once and write one CSV file per enabled \
                 table, a bounds file and optionally the highest changeset id \
                 seen. The extract must list nodes before ways before \
                 relations.",
    about = "Convert a PBF extract into CSV tables"
)]
#[ortho_config(prefix = "TABULA")]
pub(crate) struct ConvertArgs {
    /// Path to the OpenStreetMap PBF extract.
    #[arg(long = ARG_INPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// Directory for the tables and bounds file (defaults to the input's).
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Where to write the highest changeset id seen.
    #[arg(long = ARG_WATERMARK_PATH, value_name = "path")]
    #[serde(default)]
    pub(crate) watermark_path: Option<Utf8PathBuf>,
    /// Emit the tags table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) tags: Option<bool>,
    /// Emit the nodes table.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) nodes: Option<bool>,
    /// Emit the ways table (also enables node coordinate caching).
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

impl ConvertArgs {
    pub(crate) fn into_options(self) -> Result<ConvertOptions, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        options_from_args(merged)
    }
}

pub(crate) fn options_from_args(args: ConvertArgs) -> Result<ConvertOptions, CliError> {
    let input = args.input.ok_or(CliError::MissingArgument {
        field: ARG_INPUT,
        env: ENV_CONVERT_INPUT,
    })?;
    Ok(ConvertOptions {
        input,
        output_dir: args.output_dir,
        watermark_path: args.watermark_path,
        tables: table_selection(
            args.tags,
            args.nodes,
            args.ways,
            args.relations,
            args.members,
        ),
    })
}

pub(crate) fn resolve_convert_options(args: ConvertArgs) -> Result<ConvertOptions, CliError> {
    let options = args.into_options()?;
    require_existing(&options.input, ARG_INPUT)?;
    Ok(options)
}

pub(super) fn run_convert(args: ConvertArgs) -> Result<(), CliError> {
    let options = resolve_convert_options(args)?;
    execute_convert(&options)?;
    Ok(())
}

pub(crate) fn execute_convert(options: &ConvertOptions) -> Result<BulkReport, CliError> {
    let report = convert(options)?;
    info!(
        "converted {} (watermark {})",
        options.input,
        report.summary.watermark()
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) fn options_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ConvertOptions, CliError> {
    let merged = ConvertArgs::merge_from_layers(layers).map_err(CliError::from)?;
    options_from_args(merged)
}
