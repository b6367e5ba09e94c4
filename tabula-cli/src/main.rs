//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::error::Error as _;

use tabula_cli::CliError;

fn main() {
    match tabula_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("tabula: {err}");
            let mut cause = err.source();
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
            std::process::exit(1);
        }
    }
}
