//! llmroute - LLM provider routing and credit ledger
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use llmroute::cli::output::render_error;
use llmroute::cli::{Cli, OutputFormat};
use llmroute::core::logging::{self, LogSettings};

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.json_output,
        cli.verbose,
    ));

    match llmroute::cli::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            let json = cli.effective_format() == OutputFormat::Json;
            eprintln!("{}", render_error(&e, json));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
