//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/llmroute/config.toml`
//! - macOS: `~/Library/Application Support/dev.llmroute.llmroute/config.toml`
//! - Windows: `%APPDATA%/llmroute/llmroute/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `LLMROUTE_CONFIG`: Override config file path
//! - `LLMROUTE_CATALOG`: Provider catalog TOML file
//! - `LLMROUTE_CACHE_TTL`: Decision cache TTL in seconds
//! - `LLMROUTE_PROBE_INTERVAL`: Health probe interval in seconds

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::health::HealthPolicy;
use crate::core::routing::RoutingPolicy;
use crate::error::{Result, RouterError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "LLMROUTE_CONFIG";
/// Environment variable for the provider catalog file.
pub const ENV_CATALOG: &str = "LLMROUTE_CATALOG";
/// Environment variable for the decision cache TTL in seconds.
pub const ENV_CACHE_TTL: &str = "LLMROUTE_CACHE_TTL";
/// Environment variable for the health probe interval in seconds.
pub const ENV_PROBE_INTERVAL: &str = "LLMROUTE_PROBE_INTERVAL";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The file-level configuration the overrides were applied to.
    pub config: Config,
    /// Where the config file was looked for.
    pub config_path: PathBuf,
    /// Catalog file; `None` means the built-in catalog.
    pub catalog_path: Option<PathBuf>,
    /// Ledger journal database.
    pub journal_path: PathBuf,
    /// Decision cache TTL.
    pub cache_ttl: Duration,
    /// Health probe interval.
    pub probe_interval: Duration,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSources {
    pub config_path: ConfigSource,
    pub catalog_path: ConfigSource,
    pub journal_path: ConfigSource,
    pub cache_ttl: ConfigSource,
    pub probe_interval: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - An environment override does not parse
    /// - The merged configuration fails validation
    pub fn resolve(cli: &Cli, paths: &AppPaths) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let config_path = Self::resolve_config_path(cli, paths, &mut sources.config_path);
        let mut config = Config::load_from(&config_path)?;

        let catalog_path = Self::resolve_catalog_path(cli, &config, paths, &mut sources.catalog_path);
        let journal_path =
            Self::resolve_journal_path(cli, &config, paths, &mut sources.journal_path);
        let cache_ttl = Self::resolve_secs(
            ENV_CACHE_TTL,
            config.cache.ttl_secs,
            Config::default().cache.ttl_secs,
            &mut sources.cache_ttl,
        )?;
        let probe_interval = Self::resolve_secs(
            ENV_PROBE_INTERVAL,
            config.health.probe_interval_secs,
            Config::default().health.probe_interval_secs,
            &mut sources.probe_interval,
        )?;

        // Validate the effective values, not just the file.
        config.cache.ttl_secs = cache_ttl.as_secs();
        config.health.probe_interval_secs = probe_interval.as_secs();
        config.validate()?;

        Ok(Self {
            config,
            config_path,
            catalog_path,
            journal_path,
            cache_ttl,
            probe_interval,
            sources,
        })
    }

    /// Config file path, respecting `LLMROUTE_CONFIG`.
    fn resolve_config_path(cli: &Cli, paths: &AppPaths, source: &mut ConfigSource) -> PathBuf {
        if let Some(path) = &cli.config {
            *source = ConfigSource::Cli;
            return path.clone();
        }
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }
        *source = ConfigSource::Default;
        paths.config_file()
    }

    fn resolve_catalog_path(
        cli: &Cli,
        config: &Config,
        paths: &AppPaths,
        source: &mut ConfigSource,
    ) -> Option<PathBuf> {
        // 1. CLI flag
        if let Some(path) = &cli.catalog {
            *source = ConfigSource::Cli;
            return Some(path.clone());
        }

        // 2. Environment variable
        if let Ok(path) = std::env::var(ENV_CATALOG) {
            *source = ConfigSource::Env;
            return Some(PathBuf::from(path));
        }

        // 3. Config file
        if let Some(path) = &config.catalog.path {
            *source = ConfigSource::ConfigFile;
            return Some(path.clone());
        }

        // 4. catalog.toml beside the config file, else the built-in catalog
        *source = ConfigSource::Default;
        let conventional = paths.catalog_file();
        conventional.is_file().then_some(conventional)
    }

    fn resolve_journal_path(
        cli: &Cli,
        config: &Config,
        paths: &AppPaths,
        source: &mut ConfigSource,
    ) -> PathBuf {
        if let Some(path) = &cli.journal {
            *source = ConfigSource::Cli;
            return path.clone();
        }
        if let Some(path) = &config.ledger.journal_path {
            *source = ConfigSource::ConfigFile;
            return path.clone();
        }
        *source = ConfigSource::Default;
        paths.ledger_db_file()
    }

    /// Seconds from `env_var`, else the file value, else the default.
    fn resolve_secs(
        env_var: &str,
        file_value: u64,
        default_value: u64,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        if let Ok(raw) = std::env::var(env_var) {
            let secs = raw.trim().parse::<u64>().map_err(|_| RouterError::ConfigInvalid {
                key: env_var.to_string(),
                value: raw.clone(),
                message: "expected a whole number of seconds".to_string(),
            })?;
            *source = ConfigSource::Env;
            return Ok(Duration::from_secs(secs));
        }

        *source = if file_value == default_value {
            ConfigSource::Default
        } else {
            ConfigSource::ConfigFile
        };
        Ok(Duration::from_secs(file_value))
    }

    /// Routing policy from the `[routing]` section.
    #[must_use]
    pub fn routing_policy(&self) -> RoutingPolicy {
        self.config.routing.policy()
    }

    /// Health policy with the resolved probe interval applied.
    #[must_use]
    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            probe_interval: self.probe_interval,
            ..self.config.health.policy()
        }
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub routing: RoutingConfig,
    pub health: HealthConfig,
    pub cache: CacheConfig,
    pub catalog: CatalogConfig,
    pub ledger: LedgerConfig,
}

/// Routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Latency ceiling for the instant cascade step, in milliseconds.
    pub instant_latency_ceiling_ms: u64,
    /// Number of fallbacks attached to each decision.
    pub max_fallbacks: usize,
    /// Cost ceiling preferred by precision routing, in credits.
    pub precision_cost_ceiling: Decimal,
    /// Share of the token estimate treated as completion tokens.
    pub output_token_ratio: f64,
}

/// Health monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    pub degraded_success_rate: f64,
    pub ewma_alpha: f64,
}

/// Decision cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

/// Provider catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// TOML catalog file; the built-in catalog is used when unset.
    pub path: Option<PathBuf>,
    pub refresh_interval_secs: u64,
}

/// Ledger settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// `SQLite` journal path; defaults to the data directory.
    pub journal_path: Option<PathBuf>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let policy = RoutingPolicy::default();
        Self {
            instant_latency_ceiling_ms: policy.instant_latency_ceiling_ms,
            max_fallbacks: policy.max_fallbacks,
            precision_cost_ceiling: policy.precision_cost_ceiling,
            output_token_ratio: policy.output_token_ratio,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        let policy = HealthPolicy::default();
        Self {
            probe_interval_secs: policy.probe_interval.as_secs(),
            probe_timeout_secs: policy.probe_timeout.as_secs(),
            failure_threshold: policy.failure_threshold,
            recovery_threshold: policy.recovery_threshold,
            degraded_success_rate: policy.degraded_success_rate,
            ewma_alpha: policy.ewma_alpha,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            refresh_interval_secs: 300,
        }
    }
}

impl RoutingConfig {
    #[must_use]
    pub const fn policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            instant_latency_ceiling_ms: self.instant_latency_ceiling_ms,
            max_fallbacks: self.max_fallbacks,
            precision_cost_ceiling: self.precision_cost_ceiling,
            output_token_ratio: self.output_token_ratio,
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub const fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            failure_threshold: self.failure_threshold,
            recovery_threshold: self.recovery_threshold,
            degraded_success_rate: self.degraded_success_rate,
            ewma_alpha: self.ewma_alpha,
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().config_file())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RouterError::Config(format!("Invalid config file: {e}")))?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RouterError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let health = &self.health;
        if health.failure_threshold == 0 {
            return Err(invalid("health.failure_threshold", 0, "must be at least 1"));
        }
        if health.recovery_threshold == 0 {
            return Err(invalid("health.recovery_threshold", 0, "must be at least 1"));
        }
        if !(health.ewma_alpha > 0.0 && health.ewma_alpha <= 1.0) {
            return Err(invalid(
                "health.ewma_alpha",
                health.ewma_alpha,
                "must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&health.degraded_success_rate) {
            return Err(invalid(
                "health.degraded_success_rate",
                health.degraded_success_rate,
                "must be in [0, 1]",
            ));
        }
        if health.probe_timeout_secs == 0 {
            return Err(invalid("health.probe_timeout_secs", 0, "must be at least 1"));
        }
        if health.probe_timeout_secs >= health.probe_interval_secs {
            return Err(invalid(
                "health.probe_timeout_secs",
                health.probe_timeout_secs,
                "must be shorter than health.probe_interval_secs",
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs", 0, "must be at least 1"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", 0, "must be at least 1"));
        }

        if self.routing.precision_cost_ceiling.is_sign_negative() {
            return Err(invalid(
                "routing.precision_cost_ceiling",
                self.routing.precision_cost_ceiling,
                "must not be negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.routing.output_token_ratio) {
            return Err(invalid(
                "routing.output_token_ratio",
                self.routing.output_token_ratio,
                "must be in [0, 1]",
            ));
        }

        if self.catalog.refresh_interval_secs == 0 {
            return Err(invalid("catalog.refresh_interval_secs", 0, "must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display, message: &str) -> RouterError {
    RouterError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clean_config_env as clean_env, with_env};
    use clap::Parser;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["llmroute"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.health.failure_threshold, 3);
        assert_eq!(config.routing.precision_cost_ceiling, dec!(1));
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.routing.max_fallbacks, 3);
    }

    #[test]
    fn load_partial_toml_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[routing]
max_fallbacks = 5
precision_cost_ceiling = "0.50"

[health]
failure_threshold = 4
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.routing.max_fallbacks, 5);
        assert_eq!(config.routing.precision_cost_ceiling, dec!(0.50));
        assert_eq!(config.health.failure_threshold, 4);
        assert_eq!(config.health.recovery_threshold, 2);
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.cache.ttl_secs = 42;
        config.catalog.path = Some(PathBuf::from("/etc/llmroute/catalog.toml"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.cache.ttl_secs, 42);
        assert_eq!(
            loaded.catalog.path,
            Some(PathBuf::from("/etc/llmroute/catalog.toml"))
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Config)>)> = vec![
            ("health.failure_threshold", Box::new(|c| c.health.failure_threshold = 0)),
            ("health.recovery_threshold", Box::new(|c| c.health.recovery_threshold = 0)),
            ("health.ewma_alpha", Box::new(|c| c.health.ewma_alpha = 0.0)),
            ("health.ewma_alpha", Box::new(|c| c.health.ewma_alpha = 1.5)),
            ("health.degraded_success_rate", Box::new(|c| c.health.degraded_success_rate = 1.1)),
            ("health.probe_timeout_secs", Box::new(|c| c.health.probe_timeout_secs = 0)),
            ("health.probe_timeout_secs", Box::new(|c| c.health.probe_timeout_secs = 30)),
            ("cache.ttl_secs", Box::new(|c| c.cache.ttl_secs = 0)),
            ("routing.precision_cost_ceiling", Box::new(|c| c.routing.precision_cost_ceiling = dec!(-1))),
            ("routing.output_token_ratio", Box::new(|c| c.routing.output_token_ratio = 2.0)),
        ];

        for (expected_key, mutate) in cases {
            let mut config = Config::default();
            mutate(&mut config);
            match config.validate() {
                Err(RouterError::ConfigInvalid { key, .. }) => assert_eq!(key, expected_key),
                other => panic!("expected ConfigInvalid for {expected_key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn alpha_of_one_is_allowed() {
        let mut config = Config::default();
        config.health.ewma_alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn policies_follow_sections() {
        let mut config = Config::default();
        config.routing.max_fallbacks = 1;
        config.health.probe_timeout_secs = 2;
        assert_eq!(config.routing.policy().max_fallbacks, 1);
        assert_eq!(config.health.policy().probe_timeout, Duration::from_secs(2));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI flag");
        assert_eq!(ConfigSource::Env.to_string(), "environment variable");
        assert_eq!(ConfigSource::ConfigFile.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }

    #[test]
    fn resolved_defaults_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        let resolved = with_env(&clean_env(), || {
            ResolvedConfig::resolve(&cli(&["config"]), &paths).unwrap()
        });
        assert_eq!(resolved.catalog_path, None);
        assert_eq!(resolved.journal_path, paths.ledger_db_file());
        assert_eq!(resolved.cache_ttl, Duration::from_secs(300));
        assert_eq!(resolved.sources.cache_ttl, ConfigSource::Default);
        assert_eq!(resolved.sources.catalog_path, ConfigSource::Default);
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        let mut config = Config::default();
        config.cache.ttl_secs = 60;
        config.catalog.path = Some(PathBuf::from("/from/file.toml"));
        config.save_to(&paths.config_file()).unwrap();

        let mut env = clean_env();
        env.push((ENV_CACHE_TTL, Some("90")));
        env.push((ENV_CATALOG, Some("/from/env.toml")));

        let resolved = with_env(&env, || {
            ResolvedConfig::resolve(&cli(&["--catalog", "/from/cli.toml", "config"]), &paths)
                .unwrap()
        });
        assert_eq!(resolved.cache_ttl, Duration::from_secs(90));
        assert_eq!(resolved.sources.cache_ttl, ConfigSource::Env);
        assert_eq!(resolved.catalog_path, Some(PathBuf::from("/from/cli.toml")));
        assert_eq!(resolved.sources.catalog_path, ConfigSource::Cli);
    }

    #[test]
    fn file_value_reported_as_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        let mut config = Config::default();
        config.health.probe_interval_secs = 45;
        config.save_to(&paths.config_file()).unwrap();

        let resolved = with_env(&clean_env(), || {
            ResolvedConfig::resolve(&cli(&["config"]), &paths).unwrap()
        });
        assert_eq!(resolved.probe_interval, Duration::from_secs(45));
        assert_eq!(resolved.sources.probe_interval, ConfigSource::ConfigFile);
        assert_eq!(resolved.health_policy().probe_interval, Duration::from_secs(45));
    }

    #[test]
    fn catalog_beside_config_is_used_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        std::fs::create_dir_all(&paths.config).unwrap();
        std::fs::write(paths.catalog_file(), "providers = []\n").unwrap();

        let resolved = with_env(&clean_env(), || {
            ResolvedConfig::resolve(&cli(&["config"]), &paths).unwrap()
        });
        assert_eq!(resolved.catalog_path, Some(paths.catalog_file()));
        assert_eq!(resolved.sources.catalog_path, ConfigSource::Default);
    }

    #[test]
    fn config_env_var_selects_file() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.toml");
        let mut config = Config::default();
        config.routing.max_fallbacks = 1;
        config.save_to(&custom).unwrap();

        let custom_str = custom.to_string_lossy().to_string();
        let mut env: Vec<(&str, Option<&str>)> = clean_env();
        env.push((ENV_CONFIG, Some(custom_str.as_str())));

        let resolved = with_env(&env, || {
            ResolvedConfig::resolve(&cli(&["config"]), &AppPaths::rooted(dir.path())).unwrap()
        });
        assert_eq!(resolved.sources.config_path, ConfigSource::Env);
        assert_eq!(resolved.routing_policy().max_fallbacks, 1);
    }

    #[test]
    fn bad_env_value_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = clean_env();
        env.push((ENV_CACHE_TTL, Some("soon")));
        let err = with_env(&env, || {
            ResolvedConfig::resolve(&cli(&["config"]), &AppPaths::rooted(dir.path())).unwrap_err()
        });
        assert!(matches!(err, RouterError::ConfigInvalid { ref key, .. } if key == ENV_CACHE_TTL));
    }

    #[test]
    fn env_ttl_of_zero_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = clean_env();
        env.push((ENV_CACHE_TTL, Some("0")));
        let err = with_env(&env, || {
            ResolvedConfig::resolve(&cli(&["config"]), &AppPaths::rooted(dir.path())).unwrap_err()
        });
        assert!(matches!(err, RouterError::ConfigInvalid { ref key, .. } if key == "cache.ttl_secs"));
    }
}
