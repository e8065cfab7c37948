//! Provider catalog with copy-on-write snapshots.
//!
//! The active snapshot lives behind an [`ArcSwap`]; readers grab an `Arc`
//! without locking and a refresh replaces the whole snapshot at once, so a
//! reader sees either the old catalog or the new one, never a mix.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::models::{Capabilities, Capability, LatencyClass, PowerLevel, Tier};
use super::provider::{Model, Provider};
use crate::error::{Result, RouterError};

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable view of every active provider and model.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    providers: Vec<Provider>,
    /// Monotonic refresh counter; 0 for the initial snapshot.
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub source: String,
}

impl CatalogSnapshot {
    fn new(mut providers: Vec<Provider>, version: u64, source: &str) -> Self {
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            providers,
            version,
            loaded_at: Utc::now(),
            source: source.to_string(),
        }
    }

    /// All providers, ordered by id.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn provider(&self, provider_id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    #[must_use]
    pub fn model(&self, provider_id: &str, model_id: &str) -> Option<(&Provider, &Model)> {
        let provider = self.provider(provider_id)?;
        provider.model(model_id).map(|model| (provider, model))
    }

    /// Providers whose minimum tier is at or below `tier`.
    pub fn for_tier(&self, tier: Tier) -> impl Iterator<Item = &Provider> {
        self.providers.iter().filter(move |p| p.available_to(tier))
    }

    /// Every (provider, model) pair.
    pub fn candidates(&self) -> impl Iterator<Item = (&Provider, &Model)> {
        self.providers
            .iter()
            .flat_map(|p| p.models.iter().map(move |m| (p, m)))
    }

    /// Number of models across all providers.
    #[must_use]
    pub fn model_count(&self) -> usize {
        self.providers.iter().map(|p| p.models.len()).sum()
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Where a catalog refresh reads providers from.
pub trait CatalogSource: Send + Sync {
    /// Load the full provider list.
    ///
    /// # Errors
    /// Returns an error if the source is unreachable or unparsable.
    fn load(&self) -> Result<Vec<Provider>>;

    /// Short label for logs.
    fn label(&self) -> String;
}

/// Fixed in-memory provider list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    providers: Vec<Provider>,
}

impl StaticCatalog {
    #[must_use]
    pub const fn new(providers: Vec<Provider>) -> Self {
        Self { providers }
    }
}

impl CatalogSource for StaticCatalog {
    fn load(&self) -> Result<Vec<Provider>> {
        Ok(self.providers.clone())
    }

    fn label(&self) -> String {
        "static".to_string()
    }
}

/// TOML catalog file with `[[providers]]` tables and nested `[[providers.models]]`.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: Vec<Provider>,
}

impl FileCatalog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `providers` in the format [`FileCatalog`] reads.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn write(path: &Path, providers: &[Provider]) -> Result<()> {
        let file = CatalogFile {
            providers: providers.to_vec(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| RouterError::Config(format!("Failed to serialize catalog: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl CatalogSource for FileCatalog {
    fn load(&self) -> Result<Vec<Provider>> {
        tracing::debug!(path = ?self.path, "Loading catalog file");
        let content = std::fs::read_to_string(&self.path)?;
        let file: CatalogFile = toml::from_str(&content).map_err(|e| {
            RouterError::InvalidCatalog(format!("{}: {e}", self.path.display()))
        })?;
        Ok(file.providers)
    }

    fn label(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Built-in provider set used when no catalog file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl CatalogSource for BuiltinCatalog {
    fn load(&self) -> Result<Vec<Provider>> {
        Ok(builtin_providers())
    }

    fn label(&self) -> String {
        "builtin".to_string()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Registry of providers and models, replaced wholesale on refresh.
pub struct ProviderCatalog {
    current: ArcSwap<CatalogSnapshot>,
    versions: AtomicU64,
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("ProviderCatalog")
            .field("version", &snapshot.version)
            .field("providers", &snapshot.providers.len())
            .finish()
    }
}

impl ProviderCatalog {
    /// Catalog with no providers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            current: ArcSwap::from_pointee(CatalogSnapshot::new(Vec::new(), 0, "empty")),
            versions: AtomicU64::new(0),
        }
    }

    /// Catalog initialised from a validated provider list.
    ///
    /// # Errors
    /// Returns `InvalidCatalog` if the providers violate a catalog invariant.
    pub fn with_providers(providers: Vec<Provider>) -> Result<Self> {
        validate_providers(&providers)?;
        Ok(Self {
            current: ArcSwap::from_pointee(CatalogSnapshot::new(providers, 0, "initial")),
            versions: AtomicU64::new(0),
        })
    }

    /// Catalog initialised by loading `source` once.
    ///
    /// # Errors
    /// Returns an error if the source cannot be loaded or is invalid.
    pub fn from_source(source: &dyn CatalogSource) -> Result<Self> {
        let catalog = Self::empty();
        catalog.refresh(source)?;
        Ok(catalog)
    }

    /// The active snapshot. Never blocks.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    /// Providers of the active snapshot usable at `tier`.
    #[must_use]
    pub fn for_tier(&self, tier: Tier) -> Vec<Provider> {
        self.snapshot().for_tier(tier).cloned().collect()
    }

    /// Load `source` and atomically swap it in.
    ///
    /// On failure the previous snapshot keeps serving and
    /// `CatalogRefreshFailed` is returned.
    ///
    /// # Errors
    /// Returns `CatalogRefreshFailed` if loading or validation fails.
    pub fn refresh(&self, source: &dyn CatalogSource) -> Result<Arc<CatalogSnapshot>> {
        let label = source.label();
        let loaded = source
            .load()
            .and_then(|providers| validate_providers(&providers).map(|()| providers));

        let providers = match loaded {
            Ok(providers) => providers,
            Err(err) => {
                tracing::warn!(
                    source = %label,
                    error = %err,
                    active_version = self.current.load().version,
                    "Catalog refresh failed; keeping previous snapshot"
                );
                return Err(RouterError::CatalogRefreshFailed {
                    reason: err.to_string(),
                });
            }
        };

        let version = self.versions.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(CatalogSnapshot::new(providers, version, &label));
        self.current.store(Arc::clone(&snapshot));

        tracing::info!(
            source = %label,
            version,
            providers = snapshot.providers.len(),
            models = snapshot.model_count(),
            "Catalog refreshed"
        );
        Ok(snapshot)
    }
}

/// Refresh `catalog` from `source` every `every`, until the handle is aborted.
///
/// Failures are logged by [`ProviderCatalog::refresh`] and retried next tick.
pub fn spawn_refresh_loop(
    catalog: Arc<ProviderCatalog>,
    source: Arc<dyn CatalogSource>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately; the caller already loaded once.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let _ = catalog.refresh(source.as_ref());
        }
    })
}

// =============================================================================
// Validation
// =============================================================================

/// Check catalog invariants before a snapshot is published.
///
/// # Errors
/// Returns `InvalidCatalog` naming the first violation found.
pub fn validate_providers(providers: &[Provider]) -> Result<()> {
    let mut provider_ids = HashSet::new();
    for provider in providers {
        if provider.id.trim().is_empty() {
            return Err(RouterError::InvalidCatalog(
                "provider id must not be empty".to_string(),
            ));
        }
        if !provider_ids.insert(provider.id.as_str()) {
            return Err(RouterError::InvalidCatalog(format!(
                "duplicate provider id '{}'",
                provider.id
            )));
        }
        if provider.max_context_tokens == 0 {
            return Err(RouterError::InvalidCatalog(format!(
                "provider '{}' has a zero context window",
                provider.id
            )));
        }
        if provider.input_cost_per_1k.is_sign_negative()
            || provider.output_cost_per_1k.is_sign_negative()
        {
            return Err(RouterError::InvalidCatalog(format!(
                "provider '{}' has a negative price",
                provider.id
            )));
        }
        if provider.models.is_empty() {
            return Err(RouterError::InvalidCatalog(format!(
                "provider '{}' has no models",
                provider.id
            )));
        }

        let mut model_ids = HashSet::new();
        for model in &provider.models {
            if !model_ids.insert(model.id.as_str()) {
                return Err(RouterError::InvalidCatalog(format!(
                    "duplicate model id '{}' on provider '{}'",
                    model.id, provider.id
                )));
            }
            let negative = |price: Option<Decimal>| price.is_some_and(|p| p.is_sign_negative());
            if negative(model.input_cost_per_1k) || negative(model.output_cost_per_1k) {
                return Err(RouterError::InvalidCatalog(format!(
                    "model '{}/{}' has a negative price",
                    provider.id, model.id
                )));
            }
            if !(0.0..=1.0).contains(&model.quality) {
                return Err(RouterError::InvalidCatalog(format!(
                    "model '{}/{}' quality {} is outside [0, 1]",
                    provider.id, model.id, model.quality
                )));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Built-in providers
// =============================================================================

struct ProviderSpec {
    id: &'static str,
    name: &'static str,
    input: Decimal,
    output: Decimal,
    context: u32,
    caps: &'static [Capability],
    min_tier: Tier,
    is_local: bool,
    latency: LatencyClass,
}

fn add_provider(providers: &mut Vec<Provider>, spec: &ProviderSpec, models: Vec<Model>) {
    providers.push(Provider {
        id: spec.id.to_string(),
        display_name: spec.name.to_string(),
        input_cost_per_1k: spec.input,
        output_cost_per_1k: spec.output,
        max_context_tokens: spec.context,
        capabilities: spec.caps.iter().copied().collect(),
        min_tier: spec.min_tier,
        is_local: spec.is_local,
        latency_class: spec.latency,
        models,
    });
}

fn model(
    id: &str,
    prices: Option<(Decimal, Decimal)>,
    max_output_tokens: u32,
    affinity: PowerLevel,
    quality: f64,
    caps: &[Capability],
) -> Model {
    Model {
        id: id.to_string(),
        input_cost_per_1k: prices.map(|(input, _)| input),
        output_cost_per_1k: prices.map(|(_, output)| output),
        max_output_tokens,
        affinity,
        quality,
        capabilities: caps.iter().copied().collect::<Capabilities>(),
    }
}

/// Default provider set (prices per 1K tokens, USD credits).
#[must_use]
pub fn builtin_providers() -> Vec<Provider> {
    use Capability::{Code, FunctionCalling, Streaming, Vision};
    let mut providers = Vec::new();

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "ollama",
            name: "Ollama (local)",
            input: Decimal::ZERO,
            output: Decimal::ZERO,
            context: 32_768,
            caps: &[Streaming],
            min_tier: Tier::Free,
            is_local: true,
            latency: LatencyClass::Fast,
        },
        vec![
            model("llama3.1-8b", None, 4_096, PowerLevel::Eco, 0.55, &[]),
            model("qwen2.5-coder-7b", None, 4_096, PowerLevel::Eco, 0.6, &[Code]),
        ],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "openrouter-free",
            name: "OpenRouter (free models)",
            input: Decimal::ZERO,
            output: Decimal::ZERO,
            context: 32_768,
            caps: &[Streaming],
            min_tier: Tier::Free,
            is_local: false,
            latency: LatencyClass::Slow,
        },
        vec![model("mistral-7b-free", None, 4_096, PowerLevel::Eco, 0.45, &[])],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "groq",
            name: "Groq",
            input: dec!(0.00005),
            output: dec!(0.00008),
            context: 131_072,
            caps: &[Streaming, FunctionCalling],
            min_tier: Tier::Starter,
            is_local: false,
            latency: LatencyClass::Instant,
        },
        vec![
            model("llama-3.1-8b-instant", None, 8_192, PowerLevel::Eco, 0.55, &[]),
            model(
                "llama-3.3-70b-versatile",
                Some((dec!(0.00059), dec!(0.00079))),
                8_192,
                PowerLevel::Balanced,
                0.72,
                &[Code],
            ),
        ],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "deepseek",
            name: "DeepSeek",
            input: dec!(0.00027),
            output: dec!(0.0011),
            context: 65_536,
            caps: &[Streaming, FunctionCalling],
            min_tier: Tier::Starter,
            is_local: false,
            latency: LatencyClass::Normal,
        },
        vec![
            model("deepseek-chat", None, 8_192, PowerLevel::Balanced, 0.75, &[]),
            model("deepseek-coder", None, 8_192, PowerLevel::Balanced, 0.74, &[Code]),
        ],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "google",
            name: "Google Gemini",
            input: dec!(0.0001),
            output: dec!(0.0004),
            context: 1_048_576,
            caps: &[Streaming, FunctionCalling, Vision],
            min_tier: Tier::Starter,
            is_local: false,
            latency: LatencyClass::Fast,
        },
        vec![
            model("gemini-2.0-flash", None, 8_192, PowerLevel::Eco, 0.7, &[]),
            model(
                "gemini-1.5-pro",
                Some((dec!(0.00125), dec!(0.005))),
                8_192,
                PowerLevel::Precision,
                0.82,
                &[Code],
            ),
        ],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "openai",
            name: "OpenAI",
            input: dec!(0.0025),
            output: dec!(0.01),
            context: 128_000,
            caps: &[Streaming, FunctionCalling, Vision, Code],
            min_tier: Tier::Starter,
            is_local: false,
            latency: LatencyClass::Fast,
        },
        vec![
            model(
                "gpt-4o-mini",
                Some((dec!(0.00015), dec!(0.0006))),
                16_384,
                PowerLevel::Eco,
                0.68,
                &[],
            ),
            model("gpt-4o", None, 16_384, PowerLevel::Precision, 0.86, &[]),
        ],
    );

    add_provider(
        &mut providers,
        &ProviderSpec {
            id: "anthropic",
            name: "Anthropic",
            input: dec!(0.003),
            output: dec!(0.015),
            context: 200_000,
            caps: &[Streaming, FunctionCalling, Vision, Code],
            min_tier: Tier::Pro,
            is_local: false,
            latency: LatencyClass::Normal,
        },
        vec![
            model(
                "claude-3-5-haiku",
                Some((dec!(0.0008), dec!(0.004))),
                8_192,
                PowerLevel::Balanced,
                0.74,
                &[],
            ),
            model("claude-sonnet-4", None, 16_384, PowerLevel::Precision, 0.9, &[]),
        ],
    );

    providers
}
