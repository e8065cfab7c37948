//! Storage for configuration and the ledger journal.

pub mod config;
pub mod journal;
pub mod paths;

pub use config::{
    CacheConfig, CatalogConfig, Config, ConfigSource, ConfigSources, ENV_CACHE_TTL, ENV_CATALOG,
    ENV_CONFIG, ENV_PROBE_INTERVAL, HealthConfig, LedgerConfig, ResolvedConfig,
    RoutingConfig,
};
pub use journal::{SqliteJournal, run_migrations};
pub use paths::AppPaths;
