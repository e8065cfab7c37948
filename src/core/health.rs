//! Provider health tracking.
//!
//! Each provider carries a small state machine fed by probe results and real
//! call outcomes:
//!
//! - `N` consecutive failures move a provider to [`HealthStatus::Down`].
//! - While down, `M` consecutive successes bring it back to
//!   [`HealthStatus::Healthy`] with a fresh success rate.
//! - Otherwise the status is `Degraded` whenever the exponentially weighted
//!   success rate sits below the configured threshold.
//!
//! A provider that was never probed has no record; it is neither preferred
//! nor excluded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};

use super::catalog::{CatalogSnapshot, ProviderCatalog};
use super::locks;
use super::provider::Provider;
use crate::error::{Result, RouterError};

/// Success rate assigned when a provider recovers from `Down`.
const RECOVERED_SUCCESS_RATE: f64 = 1.0;

// =============================================================================
// Records
// =============================================================================

/// Health state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
        }
    }

    /// Whether routing may still use the provider.
    #[must_use]
    pub const fn is_routable(self) -> bool {
        !matches!(self, Self::Down)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling health estimate for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub status: HealthStatus,
    /// EWMA of successful call latency; `None` until the first success.
    pub avg_latency_ms: Option<f64>,
    /// EWMA of outcomes (1.0 = success, 0.0 = failure).
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub samples: u64,
    pub last_checked: DateTime<Utc>,
}

impl HealthRecord {
    fn first(latency_ms: u64, success: bool) -> Self {
        Self {
            status: HealthStatus::Healthy,
            avg_latency_ms: success.then(|| latency_ms as f64),
            success_rate: if success { 1.0 } else { 0.0 },
            consecutive_failures: 0,
            consecutive_successes: 0,
            samples: 0,
            last_checked: Utc::now(),
        }
    }

    /// Apply one outcome and return the new status.
    fn apply(&mut self, policy: &HealthPolicy, latency_ms: u64, success: bool) -> HealthStatus {
        let alpha = policy.ewma_alpha;
        let outcome = if success { 1.0 } else { 0.0 };
        if self.samples > 0 {
            self.success_rate = alpha.mul_add(outcome, (1.0 - alpha) * self.success_rate);
        }
        self.samples += 1;
        self.last_checked = Utc::now();

        if success {
            let sample = latency_ms as f64;
            self.avg_latency_ms = Some(
                self.avg_latency_ms
                    .map_or(sample, |avg| alpha.mul_add(sample, (1.0 - alpha) * avg)),
            );
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;

            if self.status == HealthStatus::Down {
                if self.consecutive_successes >= policy.recovery_threshold {
                    self.status = HealthStatus::Healthy;
                    self.success_rate = RECOVERED_SUCCESS_RATE;
                }
            } else {
                self.status = policy.classify(self.success_rate);
            }
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;

            if self.consecutive_failures >= policy.failure_threshold {
                self.status = HealthStatus::Down;
            } else if self.status != HealthStatus::Down {
                self.status = policy.classify(self.success_rate);
            }
        }
        self.status
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Thresholds and timings for the health state machine and probe loop.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    /// Consecutive failures before a provider is marked down (N).
    pub failure_threshold: u32,
    /// Consecutive successes that bring a down provider back (M).
    pub recovery_threshold: u32,
    /// Success rate below which a provider is degraded.
    pub degraded_success_rate: f64,
    /// EWMA smoothing factor in `(0, 1]`.
    pub ewma_alpha: f64,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
            degraded_success_rate: 0.9,
            ewma_alpha: 0.2,
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl HealthPolicy {
    fn classify(&self, success_rate: f64) -> HealthStatus {
        if success_rate < self.degraded_success_rate {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Per-provider health records behind a single `RwLock`.
///
/// Writers hold the lock only for one record update; routing reads a cloned
/// snapshot and never waits on an in-flight probe.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    policy: HealthPolicy,
    records: RwLock<HashMap<String, HealthRecord>>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            records: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Feed one call or probe outcome into the provider's rolling state.
    pub fn record(&self, provider_id: &str, latency_ms: u64, success: bool) -> HealthStatus {
        let mut records = locks::write(&self.records);
        let record = records
            .entry(provider_id.to_string())
            .or_insert_with(|| HealthRecord::first(latency_ms, success));
        let previous = record.status;
        let status = record.apply(&self.policy, latency_ms, success);
        let success_rate = record.success_rate;
        drop(records);

        if status != previous {
            tracing::info!(
                provider = provider_id,
                from = %previous,
                to = %status,
                success_rate,
                "Provider health changed"
            );
        }
        status
    }

    /// `false` only when the provider is down. Unknown providers are healthy.
    #[must_use]
    pub fn is_healthy(&self, provider_id: &str) -> bool {
        self.status(provider_id)
            .is_none_or(HealthStatus::is_routable)
    }

    /// Current status, or `None` if never probed.
    #[must_use]
    pub fn status(&self, provider_id: &str) -> Option<HealthStatus> {
        locks::read(&self.records).get(provider_id).map(|r| r.status)
    }

    #[must_use]
    pub fn record_for(&self, provider_id: &str) -> Option<HealthRecord> {
        locks::read(&self.records).get(provider_id).cloned()
    }

    /// Point-in-time copy of every record.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, HealthRecord> {
        locks::read(&self.records).clone()
    }

    /// Probe every provider in `snapshot` concurrently.
    ///
    /// Each probe is bounded by the policy's probe timeout; a timeout is
    /// logged and recorded as a failure.
    pub async fn probe_all<P>(&self, snapshot: &CatalogSnapshot, probe: &P) -> Vec<ProbeOutcome>
    where
        P: HealthProbe + ?Sized,
    {
        let futures: Vec<_> = snapshot
            .providers()
            .iter()
            .map(|provider| self.probe_one(provider, probe))
            .collect();

        futures::future::join_all(futures).await
    }

    async fn probe_one<P>(&self, provider: &Provider, probe: &P) -> ProbeOutcome
    where
        P: HealthProbe + ?Sized,
    {
        let limit = self.policy.probe_timeout;
        let started = Instant::now();

        let result = match timeout(limit, probe.probe(provider)).await {
            Ok(Ok(latency_ms)) => Ok(latency_ms),
            Ok(Err(err)) => {
                tracing::warn!(provider = %provider.id, error = %err, "Health probe failed");
                Err(err)
            }
            Err(_) => {
                let err = RouterError::ProviderProbeTimeout {
                    provider: provider.id.clone(),
                    timeout_ms: duration_ms(limit),
                };
                tracing::warn!(provider = %provider.id, error = %err, "Health probe timed out");
                Err(err)
            }
        };

        let status = match &result {
            Ok(latency_ms) => self.record(&provider.id, *latency_ms, true),
            Err(_) => self.record(&provider.id, duration_ms(started.elapsed()), false),
        };

        ProbeOutcome {
            provider_id: provider.id.clone(),
            status,
            result,
        }
    }
}

/// Result of probing one provider.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub provider_id: String,
    pub status: HealthStatus,
    /// Observed latency, or the probe error.
    pub result: Result<u64>,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Probe loop
// =============================================================================

/// Liveness check against one provider, returning observed latency in ms.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, provider: &Provider) -> impl Future<Output = Result<u64>> + Send;
}

/// Handle to a running probe loop. Dropping it also stops the loop.
#[derive(Debug)]
pub struct ProbeLoopHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ProbeLoopHandle {
    /// Stop the loop after the current round and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.handle).await {
            tracing::warn!(error = %err, "Health probe loop ended abnormally");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Probe the active catalog every `probe_interval`, independent of request traffic.
///
/// The first round runs immediately.
pub fn spawn<P>(
    monitor: Arc<HealthMonitor>,
    catalog: Arc<ProviderCatalog>,
    probe: Arc<P>,
) -> ProbeLoopHandle
where
    P: HealthProbe + 'static,
{
    let (tx, mut rx) = oneshot::channel::<()>();
    let every = monitor.policy.probe_interval;

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticker.tick() => {
                    let snapshot = catalog.snapshot();
                    let outcomes = monitor.probe_all(&snapshot, probe.as_ref()).await;
                    tracing::debug!(
                        probed = outcomes.len(),
                        failed = outcomes.iter().filter(|o| o.result.is_err()).count(),
                        "Health probe round complete"
                    );
                }
            }
        }
        tracing::debug!("Health probe loop stopped");
    });

    ProbeLoopHandle {
        shutdown: Some(tx),
        handle,
    }
}
