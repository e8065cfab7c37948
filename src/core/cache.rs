//! Short-lived memoization of routing decisions.
//!
//! Entries are keyed by a normalized request signature that leaves out the
//! account id and the exact token count. A cached decision is only a shape
//! hint: the engine re-validates it and recomputes costs on every hit.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::Serialize;

use super::models::{
    LatencyRequirement, PowerLevel, QualityRequirement, RoutingDecision, RoutingRequest, TaskType,
    Tier,
};

/// Upper bounds of the token-count buckets.
const TOKEN_BUCKETS: [u32; 5] = [1_024, 4_096, 16_384, 65_536, 131_072];

/// Bucket a token estimate; the last bucket is open-ended.
#[must_use]
pub fn token_bucket(tokens: u32) -> u32 {
    TOKEN_BUCKETS
        .iter()
        .copied()
        .find(|&bound| tokens <= bound)
        .unwrap_or(u32::MAX)
}

/// Normalized request signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub task_type: TaskType,
    pub latency: LatencyRequirement,
    pub privacy_required: bool,
    pub tier: Tier,
    pub power_level: PowerLevel,
    pub quality: QualityRequirement,
    pub token_bucket: u32,
    /// Whether the budget cascade step applied when the entry was computed.
    pub budget_constrained: bool,
    /// Sorted BYOK provider ids.
    pub byok: Vec<String>,
}

impl CacheKey {
    #[must_use]
    pub fn new(request: &RoutingRequest, byok: &BTreeSet<String>, budget_constrained: bool) -> Self {
        Self {
            task_type: request.task_type,
            latency: request.latency,
            privacy_required: request.privacy_required,
            tier: request.tier,
            power_level: request.power_level,
            quality: request.quality,
            token_bucket: token_bucket(request.estimated_tokens),
            budget_constrained,
            byok: byok.iter().cloned().collect(),
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    /// Hits over lookups, 0.0 when nothing was looked up.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

// =============================================================================
// Cache
// =============================================================================

/// TTL map from [`CacheKey`] to a decision shape, backed by a moka cache.
///
/// Expired entries are never returned. Moka removes them during its
/// maintenance passes, which [`DecisionCache::purge_expired`] runs on demand.
pub struct DecisionCache {
    ttl: Duration,
    entries: Cache<CacheKey, RoutingDecision>,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for DecisionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 10_000)
    }
}

impl DecisionCache {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let stats = Arc::new(CacheStats::default());
        let listener_stats = Arc::clone(&stats);
        let entries = Cache::builder()
            .max_capacity(max_entries.max(1) as u64)
            .time_to_live(ttl)
            .eviction_listener(move |_key, _value, cause: RemovalCause| {
                if cause.was_evicted() {
                    listener_stats.record_evictions(1);
                }
            })
            .build();
        Self {
            ttl,
            entries,
            stats,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached decision for `key`, if present and younger than the TTL.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<RoutingDecision> {
        let fresh = self.entries.get(key);
        if fresh.is_some() {
            self.stats.record_hit();
            tracing::trace!(?key, "Decision cache hit");
        } else {
            self.stats.record_miss();
            tracing::trace!(?key, "Decision cache miss");
        }
        fresh
    }

    /// Store `decision`. When the cache is full, moka picks the entry to
    /// evict by recency and frequency.
    pub fn insert(&self, key: CacheKey, decision: RoutingDecision) {
        self.entries.insert(key, decision);
        self.stats.record_insert();
    }

    /// Run pending maintenance; returns how many entries it evicted.
    pub fn purge_expired(&self) -> usize {
        let before = self.stats.snapshot().evictions;
        self.entries.run_pending_tasks();
        let evicted = self.stats.snapshot().evictions.saturating_sub(before);
        usize::try_from(evicted).unwrap_or(usize::MAX)
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Live entry count after pending maintenance has run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        usize::try_from(self.entries.entry_count()).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
