//! Runs a request down its fallback chain.
//!
//! The decision is made once; each target is then tried in order under the
//! caller's timeout until one succeeds. Every attempt feeds the health
//! monitor and is reported to the usage sink.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::collaborators::{ByokKeyStore, ChatMessage, CompletionClient, CompletionResponse};
use super::models::{RouteTarget, RoutingDecision, RoutingRequest};
use super::routing::RoutingEngine;
use super::settlement::{CallOutcome, Settlement, UsageSettlement};
use crate::error::{Result, RouterError};

/// One try against one target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub target: RouteTarget,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened while serving a request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub decision: RoutingDecision,
    pub served_by: RouteTarget,
    pub response: CompletionResponse,
    pub settlement: Settlement,
    pub attempts: Vec<Attempt>,
}

pub struct FallbackExecutor<C> {
    engine: Arc<RoutingEngine>,
    settlement: Arc<UsageSettlement>,
    byok: Arc<dyn ByokKeyStore>,
    client: Arc<C>,
    timeout: Duration,
}

impl<C> std::fmt::Debug for FallbackExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<C: CompletionClient> FallbackExecutor<C> {
    #[must_use]
    pub fn new(
        engine: Arc<RoutingEngine>,
        settlement: Arc<UsageSettlement>,
        byok: Arc<dyn ByokKeyStore>,
        client: Arc<C>,
    ) -> Self {
        Self {
            engine,
            settlement,
            byok,
            client,
            timeout: Duration::from_secs(60),
        }
    }

    /// Per-attempt timeout handed to the client and enforced here.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Route `request`, then call targets in order until one succeeds.
    ///
    /// # Errors
    /// - `NoProviderAvailable` from routing.
    /// - `FallbackExhausted` when every target failed.
    /// - Ledger errors from settling the successful call.
    pub async fn run(
        &self,
        request: &RoutingRequest,
        messages: &[ChatMessage],
    ) -> Result<ExecutionReport> {
        let mut byok: HashSet<String> = self.byok.providers_for(&request.account_id);
        byok.extend(request.byok_providers.iter().cloned());
        let decision = self.engine.select_provider(request, &byok)?;

        let mut attempts = Vec::new();
        for target in decision.targets() {
            let started = Instant::now();
            let result = tokio::time::timeout(
                self.timeout,
                self.client
                    .complete(&target.provider_id, &target.model_id, messages, self.timeout),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RouterError::ProviderCallTimeout {
                    provider: target.provider_id.clone(),
                    model: target.model_id.clone(),
                    timeout_ms: millis(self.timeout),
                })
            });
            let elapsed = millis(started.elapsed());

            match result {
                Ok(response) => {
                    self.engine
                        .health()
                        .record(&target.provider_id, response.latency_ms, true);
                    attempts.push(Attempt {
                        target: target.clone(),
                        latency_ms: response.latency_ms,
                        error: None,
                    });
                    let outcome = CallOutcome::success(
                        response.prompt_tokens,
                        response.completion_tokens,
                        response.latency_ms,
                    );
                    let settlement =
                        self.settlement
                            .settle_target(&request.account_id, target, &outcome)?;
                    return Ok(ExecutionReport {
                        served_by: target.clone(),
                        decision: decision.clone(),
                        response,
                        settlement,
                        attempts,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        provider = %target.provider_id,
                        model = %target.model_id,
                        error = %err,
                        attempt = attempts.len() + 1,
                        "Provider call failed; trying next target"
                    );
                    self.engine
                        .health()
                        .record(&target.provider_id, elapsed, false);
                    // Failed calls are never charged; this only reports usage.
                    let _ = self.settlement.settle_target(
                        &request.account_id,
                        target,
                        &CallOutcome::failure(Some(elapsed)),
                    );
                    attempts.push(Attempt {
                        target: target.clone(),
                        latency_ms: elapsed,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Err(RouterError::FallbackExhausted {
            attempts: attempts.len(),
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
