//! Shared state assembled once per CLI invocation.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::cli::args::{Cli, OutputFormat};
use crate::cli::render::{Theme, use_color};
use crate::core::cache::DecisionCache;
use crate::core::catalog::{BuiltinCatalog, CatalogSource, FileCatalog, ProviderCatalog};
use crate::core::health::HealthMonitor;
use crate::core::ledger::CreditLedger;
use crate::core::routing::RoutingEngine;
use crate::error::{Result, RouterError};
use crate::storage::{AppPaths, ResolvedConfig, SqliteJournal};

/// Resolved configuration plus output preferences.
#[derive(Debug)]
pub struct AppContext {
    pub config: ResolvedConfig,
    pub format: OutputFormat,
    pub pretty: bool,
    /// Styles for human output.
    pub theme: Theme,
}

impl AppContext {
    /// Resolve configuration for `cli` against the default app paths.
    ///
    /// # Errors
    /// Returns configuration errors from [`ResolvedConfig::resolve`].
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_paths(cli, &AppPaths::new())
    }

    /// Resolve configuration against explicit paths.
    ///
    /// # Errors
    /// Returns configuration errors from [`ResolvedConfig::resolve`].
    pub fn load_with_paths(cli: &Cli, paths: &AppPaths) -> Result<Self> {
        Ok(Self {
            config: ResolvedConfig::resolve(cli, paths)?,
            format: cli.effective_format(),
            pretty: cli.pretty,
            theme: Theme::new(use_color(cli.no_color)),
        })
    }

    /// Catalog source named by the configuration.
    #[must_use]
    pub fn catalog_source(&self) -> Arc<dyn CatalogSource> {
        match &self.config.catalog_path {
            Some(path) => Arc::new(FileCatalog::new(path)),
            None => Arc::new(BuiltinCatalog),
        }
    }

    /// Load and validate the catalog.
    ///
    /// # Errors
    /// Returns `CatalogRefreshFailed` if the source cannot be read or is invalid.
    pub fn catalog(&self) -> Result<Arc<ProviderCatalog>> {
        let source = self.catalog_source();
        Ok(Arc::new(ProviderCatalog::from_source(source.as_ref())?))
    }

    /// Open the journal and rebuild the ledger from it.
    ///
    /// # Errors
    /// Returns `Storage` if the journal cannot be opened or is inconsistent.
    pub fn ledger(&self) -> Result<Arc<CreditLedger>> {
        let journal = Arc::new(SqliteJournal::open(&self.config.journal_path)?);
        Ok(Arc::new(CreditLedger::restore(journal)?))
    }

    /// Routing engine over the configured catalog and ledger.
    ///
    /// # Errors
    /// Returns catalog or ledger loading errors.
    pub fn engine(&self) -> Result<RoutingEngine> {
        let config = &self.config;
        Ok(RoutingEngine::new(
            self.catalog()?,
            Arc::new(HealthMonitor::new(config.health_policy())),
            self.ledger()?,
            Arc::new(DecisionCache::new(
                config.cache_ttl,
                config.config.cache.max_entries,
            )),
            config.routing_policy(),
        ))
    }

    /// Print `value` as JSON honoring `--pretty`.
    ///
    /// # Errors
    /// Returns `Json` if serialization fails.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }?;
        println!("{json}");
        Ok(())
    }
}

/// Parse a decimal CLI argument.
///
/// # Errors
/// Returns `Config` naming the argument when `raw` is not a number.
pub fn parse_amount(name: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|_| RouterError::Config(format!("Invalid {name} '{raw}': expected a decimal number")))
}

/// Parse an enum-like CLI argument with its `from_arg` parser.
///
/// # Errors
/// Returns `Config` listing the accepted values.
pub fn parse_choice<T>(name: &str, raw: &str, valid: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(raw).ok_or_else(|| {
        RouterError::Config(format!("Invalid {name} '{raw}'. Valid values: {valid}"))
    })
}
