//! Core routing data models.
//!
//! Closed enums for every routing dimension plus the request/decision value
//! objects exchanged with callers. Invalid dimension values are rejected when
//! parsed (`from_arg`) rather than silently ignored at routing time.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Subscription Tier
// =============================================================================

/// Subscription tier of an account. Ordered: `Free < Starter < Pro < Enterprise`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: &'static [Self] = &[Self::Free, Self::Starter, Self::Pro, Self::Enterprise];

    /// Parse from CLI/config argument (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Some(Self::Free),
            "starter" | "basic" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Declared provider/model capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Code,
    Vision,
    FunctionCalling,
    Streaming,
}

impl Capability {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Vision => "vision",
            Self::FunctionCalling => "function_calling",
            Self::Streaming => "streaming",
        }
    }
}

/// Set of capabilities, ordered for stable output.
pub type Capabilities = BTreeSet<Capability>;

// =============================================================================
// Latency
// =============================================================================

/// Static latency class declared in the catalog.
///
/// Used whenever a provider has no health record yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyClass {
    Instant,
    Fast,
    #[default]
    Normal,
    Slow,
}

impl LatencyClass {
    /// Nominal latency for this class in milliseconds.
    #[must_use]
    pub const fn nominal_ms(self) -> u64 {
        match self {
            Self::Instant => 300,
            Self::Fast => 800,
            Self::Normal => 2_000,
            Self::Slow => 5_000,
        }
    }
}

/// Caller's latency requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyRequirement {
    Instant,
    Fast,
    #[default]
    Normal,
    Slow,
}

impl LatencyRequirement {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "instant" => Some(Self::Instant),
            "fast" => Some(Self::Fast),
            "normal" => Some(Self::Normal),
            "slow" => Some(Self::Slow),
            _ => None,
        }
    }
}

// =============================================================================
// Task / Quality / Power Level
// =============================================================================

/// Kind of work the request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Code,
    #[default]
    Chat,
    Rag,
    Creative,
    Analysis,
}

impl TaskType {
    /// All task types.
    pub const ALL: &'static [Self] = &[
        Self::Code,
        Self::Chat,
        Self::Rag,
        Self::Creative,
        Self::Analysis,
    ];

    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "code" => Some(Self::Code),
            "chat" => Some(Self::Chat),
            "rag" => Some(Self::Rag),
            "creative" => Some(Self::Creative),
            "analysis" => Some(Self::Analysis),
            _ => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Chat => "chat",
            Self::Rag => "rag",
            Self::Creative => "creative",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum quality the caller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRequirement {
    Basic,
    #[default]
    Good,
    Best,
}

impl QualityRequirement {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "good" => Some(Self::Good),
            "best" => Some(Self::Best),
            _ => None,
        }
    }

    /// Minimum model quality score satisfying this requirement.
    #[must_use]
    pub const fn floor(self) -> f64 {
        match self {
            Self::Basic => 0.0,
            Self::Good => 0.6,
            Self::Best => 0.8,
        }
    }
}

/// Coarse routing policy trading cost against quality.
///
/// Doubles as the model "power-level affinity" tag in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerLevel {
    Eco,
    #[default]
    Balanced,
    Precision,
}

impl PowerLevel {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "eco" | "economy" => Some(Self::Eco),
            "balanced" => Some(Self::Balanced),
            "precision" => Some(Self::Precision),
            _ => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eco => "eco",
            Self::Balanced => "balanced",
            Self::Precision => "precision",
        }
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Routing Request
// =============================================================================

/// Everything the engine needs to know about one request. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRequest {
    pub task_type: TaskType,
    pub estimated_tokens: u32,
    pub latency: LatencyRequirement,
    pub privacy_required: bool,
    pub tier: Tier,
    /// Credits remaining at lookup time; the ledger balance wins when the
    /// account exists there.
    pub credits_remaining: Decimal,
    pub quality: QualityRequirement,
    pub power_level: PowerLevel,
    pub account_id: String,
    /// Providers for which the caller holds a BYOK credential.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub byok_providers: Vec<String>,
}

impl RoutingRequest {
    /// Create a request with default dimensions for an account.
    #[must_use]
    pub fn new(account_id: impl Into<String>, task_type: TaskType, estimated_tokens: u32) -> Self {
        Self {
            task_type,
            estimated_tokens,
            latency: LatencyRequirement::default(),
            privacy_required: false,
            tier: Tier::default(),
            credits_remaining: Decimal::ZERO,
            quality: QualityRequirement::default(),
            power_level: PowerLevel::default(),
            account_id: account_id.into(),
            byok_providers: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub const fn with_credits(mut self, credits: Decimal) -> Self {
        self.credits_remaining = credits;
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: LatencyRequirement) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn with_quality(mut self, quality: QualityRequirement) -> Self {
        self.quality = quality;
        self
    }

    #[must_use]
    pub const fn with_power_level(mut self, power_level: PowerLevel) -> Self {
        self.power_level = power_level;
        self
    }

    #[must_use]
    pub const fn with_privacy(mut self, privacy_required: bool) -> Self {
        self.privacy_required = privacy_required;
        self
    }

    #[must_use]
    pub fn with_byok<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.byok_providers = providers.into_iter().map(Into::into).collect();
        self
    }
}

// =============================================================================
// Routing Decision
// =============================================================================

/// One concrete provider/model choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTarget {
    pub provider_id: String,
    pub model_id: String,
    pub estimated_cost: Decimal,
    /// Served with the caller's own key; never metered by the platform.
    pub byok: bool,
}

impl RouteTarget {
    /// Whether this target shares provider and model with `other`.
    #[must_use]
    pub fn same_route(&self, other: &Self) -> bool {
        self.provider_id == other.provider_id && self.model_id == other.model_id
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

/// Which cascade branch produced the candidate pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    Privacy,
    Byok,
    Instant,
    Budget,
    TaskAffinity,
    Default,
}

impl CascadeStep {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Privacy => "privacy",
            Self::Byok => "byok",
            Self::Instant => "instant",
            Self::Budget => "budget",
            Self::TaskAffinity => "task_affinity",
            Self::Default => "default",
        }
    }
}

/// Outcome of `select_provider`: a primary target plus an ordered fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub primary: RouteTarget,
    pub fallbacks: Vec<RouteTarget>,
    pub cascade_step: CascadeStep,
    /// Human-readable reasoning; not meant to be parsed.
    pub justification: String,
    pub cache_hit: bool,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecision {
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.primary.provider_id
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.primary.model_id
    }

    #[must_use]
    pub const fn estimated_cost(&self) -> Decimal {
        self.primary.estimated_cost
    }

    #[must_use]
    pub const fn is_byok(&self) -> bool {
        self.primary.byok
    }

    /// Primary followed by every fallback, in retry order.
    pub fn targets(&self) -> impl Iterator<Item = &RouteTarget> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}
