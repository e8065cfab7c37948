//! Test utilities for llmroute.
//!
//! Provides shared helpers, test data factories, and assertion macros
//! for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use llmroute::test_utils::*;
//!
//! let provider = make_test_provider("acme", Tier::Starter, LatencyClass::Fast);
//! let engine = make_test_engine(vec![provider]);
//! ```

use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;

use crate::core::cache::DecisionCache;
use crate::core::catalog::ProviderCatalog;
use crate::core::health::{HealthMonitor, HealthPolicy};
use crate::core::ledger::{CreditKind, CreditLedger, TransactionMeta};
use crate::core::models::{Capabilities, Capability, LatencyClass, PowerLevel, Tier};
use crate::core::provider::{Model, Provider};
use crate::core::routing::{RoutingEngine, RoutingPolicy};

// =============================================================================
// Test Data Factories
// =============================================================================

/// Create a paid test provider with one balanced model.
///
/// Prices are 0.001 input / 0.002 output per 1K tokens and the context
/// window is 32K.
#[must_use]
pub fn make_test_provider(id: &str, min_tier: Tier, latency_class: LatencyClass) -> Provider {
    Provider {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        input_cost_per_1k: Decimal::new(1, 3),
        output_cost_per_1k: Decimal::new(2, 3),
        max_context_tokens: 32_768,
        capabilities: [Capability::Streaming].into_iter().collect(),
        min_tier,
        is_local: false,
        latency_class,
        models: vec![make_test_model(&format!("{id}-model"), 0.7, PowerLevel::Balanced)],
    }
}

/// Create a local (free, privacy-eligible) test provider.
#[must_use]
pub fn make_test_local_provider(id: &str) -> Provider {
    Provider {
        input_cost_per_1k: Decimal::ZERO,
        output_cost_per_1k: Decimal::ZERO,
        is_local: true,
        min_tier: Tier::Free,
        ..make_test_provider(id, Tier::Free, LatencyClass::Fast)
    }
}

/// Create a test model without price overrides.
#[must_use]
pub fn make_test_model(id: &str, quality: f64, affinity: PowerLevel) -> Model {
    Model {
        id: id.to_string(),
        input_cost_per_1k: None,
        output_cost_per_1k: None,
        max_output_tokens: 4_096,
        affinity,
        quality,
        capabilities: Capabilities::new(),
    }
}

/// Create a ledger holding `amount` purchased credits for `account_id`.
///
/// # Panics
///
/// Panics if `amount` is not positive.
#[must_use]
pub fn make_funded_ledger(account_id: &str, amount: Decimal) -> Arc<CreditLedger> {
    let ledger = Arc::new(CreditLedger::new());
    ledger
        .credit(account_id, amount, CreditKind::Purchase, TransactionMeta::default())
        .expect("fund test account");
    ledger
}

/// Routing engine over `providers` with default policies and an empty ledger.
///
/// # Panics
///
/// Panics if `providers` is not a valid catalog.
#[must_use]
pub fn make_test_engine(providers: Vec<Provider>) -> RoutingEngine {
    make_test_engine_with_ledger(providers, Arc::new(CreditLedger::new()))
}

/// Routing engine over `providers` sharing `ledger`.
///
/// # Panics
///
/// Panics if `providers` is not a valid catalog.
#[must_use]
pub fn make_test_engine_with_ledger(
    providers: Vec<Provider>,
    ledger: Arc<CreditLedger>,
) -> RoutingEngine {
    RoutingEngine::new(
        Arc::new(ProviderCatalog::with_providers(providers).expect("valid test catalog")),
        Arc::new(HealthMonitor::new(HealthPolicy::default())),
        ledger,
        Arc::new(DecisionCache::default()),
        RoutingPolicy::default(),
    )
}

/// A two-provider catalog file in the `[[providers]]` TOML layout.
#[must_use]
pub fn make_test_catalog_toml() -> String {
    r#"[[providers]]
id = "local-llm"
display_name = "Local LLM"
input_cost_per_1k = "0"
output_cost_per_1k = "0"
max_context_tokens = 8192
capabilities = ["streaming"]
min_tier = "free"
is_local = true
latency_class = "fast"

[[providers.models]]
id = "tiny"
max_output_tokens = 2048
affinity = "eco"
quality = 0.5

[[providers]]
id = "cloud"
display_name = "Cloud"
input_cost_per_1k = "0.001"
output_cost_per_1k = "0.002"
max_context_tokens = 65536
capabilities = ["streaming", "code"]
min_tier = "starter"
latency_class = "normal"

[[providers.models]]
id = "large"
max_output_tokens = 4096
affinity = "precision"
quality = 0.85
"#
    .to_string()
}

// =============================================================================
// Environment
// =============================================================================

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with environment variables set (`Some`) or removed (`None`),
/// restoring prior values afterwards. Calls are serialized process-wide.
#[allow(unsafe_code)]
pub fn with_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let saved: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, _)| ((*key).to_string(), std::env::var(key).ok()))
        .collect();
    for (key, value) in vars {
        // SAFETY: all mutation goes through ENV_LOCK.
        unsafe {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
    let out = f();
    for (key, value) in saved {
        // SAFETY: all mutation goes through ENV_LOCK.
        unsafe {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
    out
}

/// The `LLMROUTE_*` configuration variables, all cleared.
#[must_use]
pub fn clean_config_env() -> Vec<(&'static str, Option<&'static str>)> {
    use crate::storage::config::{ENV_CACHE_TTL, ENV_CATALOG, ENV_CONFIG, ENV_PROBE_INTERVAL};
    vec![
        (ENV_CONFIG, None),
        (ENV_CATALOG, None),
        (ENV_CACHE_TTL, None),
        (ENV_PROBE_INTERVAL, None),
    ]
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// Temporary directory that is deleted on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file in the temporary directory with the given content.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
        path
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a `Result` is an `Err` matching a `RouterError` pattern.
#[macro_export]
macro_rules! assert_router_err {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err(err) => assert!(
                matches!(err, $pattern),
                "Expected {}, got {:?}",
                stringify!($pattern),
                err
            ),
            Ok(value) => panic!("Expected {}, got Ok({:?})", stringify!($pattern), value),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{CatalogSource, FileCatalog, validate_providers};

    #[test]
    fn factories_build_a_valid_catalog() {
        let providers = vec![
            make_test_provider("a", Tier::Starter, LatencyClass::Fast),
            make_test_local_provider("b"),
        ];
        validate_providers(&providers).unwrap();
    }

    #[test]
    fn catalog_toml_loads() {
        let dir = TestDir::new();
        let path = dir.create_file("catalog.toml", &make_test_catalog_toml());
        let providers = FileCatalog::new(path).load().unwrap();
        assert_eq!(providers.len(), 2);
        validate_providers(&providers).unwrap();
        assert!(providers[0].is_local);
    }

    #[test]
    fn with_env_restores_previous_value() {
        let key = "LLMROUTE_TEST_UTILS_PROBE";
        with_env(&[(key, Some("1"))], || {
            assert_eq!(std::env::var(key).as_deref(), Ok("1"));
        });
        assert!(std::env::var(key).is_err());
    }
}
