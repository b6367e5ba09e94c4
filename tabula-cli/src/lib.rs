//! Command-line interface turning OSM extracts and augmented diffs into CSV
//! tables.
#![forbid(unsafe_code)]

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use tabula_core::TableSelection;

mod convert;
mod error;
mod poll;

pub use error::CliError;

use convert::ConvertArgs;
use poll::PollArgs;

pub(crate) const ARG_INPUT: &str = "input";
pub(crate) const ARG_OUTPUT_DIR: &str = "output-dir";
pub(crate) const ARG_WATERMARK: &str = "watermark";
pub(crate) const ARG_WATERMARK_PATH: &str = "watermark-path";
pub(crate) const ARG_WATERMARK_KIND: &str = "watermark-kind";
pub(crate) const ARG_BASE_URL: &str = "base-url";
pub(crate) const ARG_MIN_LON: &str = "min-lon";
pub(crate) const ARG_MIN_LAT: &str = "min-lat";
pub(crate) const ARG_MAX_LON: &str = "max-lon";
pub(crate) const ARG_MAX_LAT: &str = "max-lat";
pub(crate) const ENV_CONVERT_INPUT: &str = "TABULA_CMDS_CONVERT_INPUT";
pub(crate) const ENV_POLL_OUTPUT_DIR: &str = "TABULA_CMDS_POLL_OUTPUT_DIR";

/// Run the Tabula CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbose);
    match cli.command {
        Command::Convert(args) => convert::run_convert(args),
        Command::Poll(args) => poll::run_poll(args),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

#[derive(Debug, Parser)]
#[command(
    name = "tabula",
    about = "Convert OpenStreetMap data into CSV tables",
    version
)]
struct Cli {
    /// Log per-run progress at debug level (`RUST_LOG` still wins).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a PBF extract into CSV tables plus bounds and watermark files.
    Convert(ConvertArgs),
    /// Fetch the next augmented diff and write its created entities.
    Poll(PollArgs),
}

/// Per-table switches shared by both subcommands; an unset switch is on.
pub(crate) const fn table_selection(
    tags: Option<bool>,
    nodes: Option<bool>,
    ways: Option<bool>,
    relations: Option<bool>,
    members: Option<bool>,
) -> TableSelection {
    const fn on(flag: Option<bool>) -> bool {
        match flag {
            Some(value) => value,
            None => true,
        }
    }
    TableSelection {
        tags: on(tags),
        nodes: on(nodes),
        ways: on(ways),
        relations: on(relations),
        members: on(members),
    }
}

/// Fail unless `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match tabula_fs::is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests;
