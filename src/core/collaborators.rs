//! External collaborators the routing core consumes.
//!
//! Identity, BYOK lookup, the usage sink and the provider call itself live
//! outside this crate; these traits pin down the shapes the core needs, and
//! the in-memory implementations back the CLI and tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::locks;
use super::models::{RoutingRequest, TaskType, Tier};
use crate::error::{Result, RouterError};

// =============================================================================
// Identity
// =============================================================================

/// Tier and credit snapshot for an authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    pub account_id: String,
    pub tier: Tier,
    pub credits_remaining: Decimal,
}

/// Resolves an account id to its current tier and credits.
pub trait IdentityLookup: Send + Sync {
    /// # Errors
    /// Returns `AccountNotFound` for unknown accounts.
    fn lookup(&self, account_id: &str) -> Result<IdentityProfile>;
}

/// Fixed identity table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    profiles: HashMap<String, IdentityProfile>,
}

impl StaticIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, account_id: &str, tier: Tier, credits_remaining: Decimal) -> Self {
        self.profiles.insert(
            account_id.to_string(),
            IdentityProfile {
                account_id: account_id.to_string(),
                tier,
                credits_remaining,
            },
        );
        self
    }
}

impl IdentityLookup for StaticIdentity {
    fn lookup(&self, account_id: &str) -> Result<IdentityProfile> {
        self.profiles
            .get(account_id)
            .cloned()
            .ok_or_else(|| RouterError::AccountNotFound(account_id.to_string()))
    }
}

impl RoutingRequest {
    /// Request pre-filled with the profile's account, tier and credits.
    #[must_use]
    pub fn from_profile(profile: &IdentityProfile, task_type: TaskType, estimated_tokens: u32) -> Self {
        Self::new(profile.account_id.clone(), task_type, estimated_tokens)
            .with_tier(profile.tier)
            .with_credits(profile.credits_remaining)
    }
}

// =============================================================================
// BYOK
// =============================================================================

/// Provider ids an account holds its own key for. Key material never
/// crosses this boundary.
pub trait ByokKeyStore: Send + Sync {
    fn providers_for(&self, account_id: &str) -> HashSet<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticByokStore {
    keys: HashMap<String, HashSet<String>>,
}

impl StaticByokStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, account_id: &str, provider_id: &str) -> Self {
        self.keys
            .entry(account_id.to_string())
            .or_default()
            .insert(provider_id.to_string());
        self
    }
}

impl ByokKeyStore for StaticByokStore {
    fn providers_for(&self, account_id: &str) -> HashSet<String> {
        self.keys.get(account_id).cloned().unwrap_or_default()
    }
}

// =============================================================================
// Usage sink
// =============================================================================

/// One completed (or failed) provider call, as sent to analytics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub account_id: String,
    pub provider_id: String,
    pub model_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub success: bool,
    pub byok: bool,
    /// `false` when the ledger refused the debit.
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

/// Analytics sink. Write failures are logged by the caller, never retried.
pub trait UsageSink: Send + Sync {
    /// # Errors
    /// Returns an error if the record could not be written.
    fn record(&self, record: &UsageRecord) -> Result<()>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
    failing: bool,
}

impl MemoryUsageSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn records(&self) -> Vec<UsageRecord> {
        locks::lock(&self.records).clone()
    }
}

impl UsageSink for MemoryUsageSink {
    fn record(&self, record: &UsageRecord) -> Result<()> {
        if self.failing {
            return Err(RouterError::Storage("usage sink unavailable".to_string()));
        }
        locks::lock(&self.records).push(record.clone());
        Ok(())
    }
}

/// Emits each record as a structured `info` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, record: &UsageRecord) -> Result<()> {
        tracing::info!(
            account = %record.account_id,
            provider = %record.provider_id,
            model = %record.model_id,
            prompt_tokens = record.prompt_tokens,
            completion_tokens = record.completion_tokens,
            cost = %record.cost,
            latency_ms = record.latency_ms,
            success = record.success,
            byok = record.byok,
            settled = record.settled,
            "usage"
        );
        Ok(())
    }
}

// =============================================================================
// Provider call
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage and latency reported by a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
}

/// The abstracted vendor call. Implementations must honor `timeout`.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        provider_id: &str,
        model_id: &str,
        messages: &[ChatMessage],
        timeout: Duration,
    ) -> impl Future<Output = Result<CompletionResponse>> + Send;
}
