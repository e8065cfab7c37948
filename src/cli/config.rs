//! `config` command: print the resolved configuration with value sources.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::cli::context::AppContext;
use crate::cli::output::RobotOutput;
use crate::error::Result;
use crate::storage::config::{Config, ConfigSources};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView<'a> {
    config_path: &'a Path,
    catalog_path: Option<&'a Path>,
    journal_path: &'a Path,
    cache_ttl_secs: u64,
    probe_interval_secs: u64,
    settings: &'a Config,
    sources: &'a ConfigSources,
}

/// Execute the config command.
///
/// # Errors
/// Returns `Json` if serialization fails.
pub fn execute(ctx: &AppContext) -> Result<()> {
    let resolved = &ctx.config;
    let view = ConfigView {
        config_path: &resolved.config_path,
        catalog_path: resolved.catalog_path.as_deref(),
        journal_path: &resolved.journal_path,
        cache_ttl_secs: resolved.cache_ttl.as_secs(),
        probe_interval_secs: resolved.probe_interval.as_secs(),
        settings: &resolved.config,
        sources: &resolved.sources,
    };

    match ctx.format {
        OutputFormat::Json => ctx.print_json(&RobotOutput::new("config", &view)),
        OutputFormat::Human => {
            let sources = &resolved.sources;
            println!(
                "config file:    {} ({})",
                resolved.config_path.display(),
                sources.config_path
            );
            println!(
                "catalog:        {} ({})",
                resolved
                    .catalog_path
                    .as_deref()
                    .map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
                sources.catalog_path
            );
            println!(
                "journal:        {} ({})",
                resolved.journal_path.display(),
                sources.journal_path
            );
            println!(
                "cache ttl:      {}s ({})",
                resolved.cache_ttl.as_secs(),
                sources.cache_ttl
            );
            println!(
                "probe interval: {}s ({})",
                resolved.probe_interval.as_secs(),
                sources.probe_interval
            );
            let body = toml::to_string_pretty(&resolved.config).map_err(|e| {
                crate::error::RouterError::Config(format!("Failed to serialize config: {e}"))
            })?;
            println!("\n{body}");
            Ok(())
        }
    }
}
