//! Post-call usage settlement.
//!
//! Actual cost is computed from the real token counts at the target's
//! effective price. It is kept separate from the routing-time estimate and
//! may exceed it.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use super::catalog::ProviderCatalog;
use super::collaborators::{UsageRecord, UsageSink};
use super::ledger::{CreditLedger, LedgerReceipt, TransactionMeta};
use super::models::{RouteTarget, RoutingDecision};
use super::provider::ModelPricing;
use crate::error::{Result, RouterError};

/// What actually happened on a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: Option<u64>,
    pub success: bool,
}

impl CallOutcome {
    #[must_use]
    pub const fn success(prompt_tokens: u32, completion_tokens: u32, latency_ms: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            latency_ms: Some(latency_ms),
            success: true,
        }
    }

    #[must_use]
    pub const fn failure(latency_ms: Option<u64>) -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            latency_ms,
            success: false,
        }
    }
}

/// Result of a successful settlement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub cost: Decimal,
    /// Ledger receipt when a debit was applied.
    pub receipt: Option<LedgerReceipt>,
    pub record: UsageRecord,
}

impl Settlement {
    #[must_use]
    pub const fn charged(&self) -> bool {
        self.receipt.is_some()
    }
}

/// Applies call costs to the ledger and reports usage.
pub struct UsageSettlement {
    catalog: Arc<ProviderCatalog>,
    ledger: Arc<CreditLedger>,
    sink: Arc<dyn UsageSink>,
}

impl std::fmt::Debug for UsageSettlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageSettlement").finish_non_exhaustive()
    }
}

impl UsageSettlement {
    #[must_use]
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        ledger: Arc<CreditLedger>,
        sink: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            sink,
        }
    }

    /// Cost of `prompt`/`completion` tokens on `target`.
    ///
    /// BYOK targets and local providers cost nothing.
    ///
    /// # Errors
    /// Returns `InvalidCatalog` if a metered target is no longer in the catalog.
    pub fn actual_cost(&self, target: &RouteTarget, prompt: u32, completion: u32) -> Result<Decimal> {
        if target.byok {
            return Ok(Decimal::ZERO);
        }
        let snapshot = self.catalog.snapshot();
        let (provider, model) = snapshot
            .model(&target.provider_id, &target.model_id)
            .ok_or_else(|| {
                RouterError::InvalidCatalog(format!("cannot price {target}: not in the active catalog"))
            })?;
        Ok(ModelPricing::resolve(provider, model).cost(prompt, completion))
    }

    /// Settle a call served by the decision's primary target.
    ///
    /// # Errors
    /// See [`Self::settle_target`].
    pub fn settle(
        &self,
        account_id: &str,
        decision: &RoutingDecision,
        prompt_tokens: u32,
        completion_tokens: u32,
        success: bool,
    ) -> Result<Settlement> {
        let outcome = CallOutcome {
            prompt_tokens,
            completion_tokens,
            latency_ms: None,
            success,
        };
        self.settle_target(account_id, &decision.primary, &outcome)
    }

    /// Settle a call against whichever target served it.
    ///
    /// Failed calls are not charged. A positive cost is debited from the
    /// account; a usage record is written in every case, flagged unsettled
    /// when the debit was refused.
    ///
    /// # Errors
    /// Returns the ledger error (`InsufficientFunds`, `SpendingCapExceeded`,
    /// `Storage`) or `InvalidCatalog` when pricing fails.
    pub fn settle_target(
        &self,
        account_id: &str,
        target: &RouteTarget,
        outcome: &CallOutcome,
    ) -> Result<Settlement> {
        let cost = if outcome.success {
            match self.actual_cost(target, outcome.prompt_tokens, outcome.completion_tokens) {
                Ok(cost) => cost,
                Err(err) => {
                    self.write_usage(account_id, target, outcome, Decimal::ZERO, None, false);
                    return Err(err);
                }
            }
        } else {
            Decimal::ZERO
        };

        if cost <= Decimal::ZERO {
            let record = self.write_usage(account_id, target, outcome, Decimal::ZERO, None, true);
            return Ok(Settlement {
                cost: Decimal::ZERO,
                receipt: None,
                record,
            });
        }

        let meta = TransactionMeta::usage(
            &target.provider_id,
            &target.model_id,
            outcome.prompt_tokens,
            outcome.completion_tokens,
        );
        match self.ledger.debit(account_id, cost, meta) {
            Ok(receipt) => {
                let record =
                    self.write_usage(account_id, target, outcome, cost, Some(receipt), true);
                Ok(Settlement {
                    cost,
                    receipt: Some(receipt),
                    record,
                })
            }
            Err(err) => {
                self.write_usage(account_id, target, outcome, cost, None, false);
                Err(err)
            }
        }
    }

    fn write_usage(
        &self,
        account_id: &str,
        target: &RouteTarget,
        outcome: &CallOutcome,
        cost: Decimal,
        receipt: Option<LedgerReceipt>,
        settled: bool,
    ) -> UsageRecord {
        let record = UsageRecord {
            account_id: account_id.to_string(),
            provider_id: target.provider_id.clone(),
            model_id: target.model_id.clone(),
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            cost,
            latency_ms: outcome.latency_ms,
            success: outcome.success,
            byok: target.byok,
            settled,
            tx_id: receipt.map(|r| r.tx_id),
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.sink.record(&record) {
            tracing::warn!(
                account = account_id,
                provider = %target.provider_id,
                error = %err,
                "Failed to write usage record"
            );
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::builtin_providers;
    use crate::core::collaborators::MemoryUsageSink;
    use crate::core::ledger::CreditKind;
    use crate::core::models::CascadeStep;
    use rust_decimal_macros::dec;

    fn target(provider: &str, model: &str, byok: bool) -> RouteTarget {
        RouteTarget {
            provider_id: provider.to_string(),
            model_id: model.to_string(),
            estimated_cost: Decimal::ZERO,
            byok,
        }
    }

    fn setup(balance: Decimal) -> (UsageSettlement, Arc<CreditLedger>, Arc<MemoryUsageSink>) {
        let catalog = Arc::new(ProviderCatalog::with_providers(builtin_providers()).unwrap());
        let ledger = Arc::new(CreditLedger::new());
        ledger
            .credit("acct", balance, CreditKind::Purchase, TransactionMeta::default())
            .unwrap();
        let sink = Arc::new(MemoryUsageSink::new());
        let settlement = UsageSettlement::new(catalog, Arc::clone(&ledger), sink.clone());
        (settlement, ledger, sink)
    }

    #[test]
    fn successful_call_is_debited_at_model_price() {
        let (settlement, ledger, sink) = setup(dec!(1));
        let outcome = CallOutcome::success(2_000, 1_000, 900);
        let result = settlement
            .settle_target("acct", &target("anthropic", "claude-sonnet-4", false), &outcome)
            .unwrap();
        // 2 * 0.003 + 1 * 0.015
        assert_eq!(result.cost, dec!(0.021));
        assert!(result.charged());
        assert_eq!(ledger.balance("acct"), dec!(0.979));
        assert!(sink.records()[0].settled);
    }

    #[test]
    fn byok_local_and_failed_calls_are_free() {
        let (settlement, ledger, sink) = setup(dec!(1));
        let ok = CallOutcome::success(5_000, 5_000, 100);
        settlement
            .settle_target("acct", &target("openai", "gpt-4o", true), &ok)
            .unwrap();
        settlement
            .settle_target("acct", &target("ollama", "llama3.1-8b", false), &ok)
            .unwrap();
        settlement
            .settle_target("acct", &target("openai", "gpt-4o", false), &CallOutcome::failure(Some(30)))
            .unwrap();
        assert_eq!(ledger.balance("acct"), dec!(1));
        assert_eq!(ledger.transactions("acct").len(), 1);
        assert_eq!(sink.records().len(), 3);
    }

    #[test]
    fn insufficient_funds_leaves_balance_and_records_attempt() {
        let (settlement, ledger, sink) = setup(dec!(0.01));
        let decision = RoutingDecision {
            primary: target("openai", "gpt-4o", false),
            fallbacks: Vec::new(),
            cascade_step: CascadeStep::Default,
            justification: String::new(),
            cache_hit: false,
            decided_at: Utc::now(),
        };
        // 10 * 0.0025 + 2.5 * 0.01 = 0.05
        let err = settlement
            .settle("acct", &decision, 10_000, 2_500, true)
            .unwrap_err();
        assert!(matches!(err, RouterError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance("acct"), dec!(0.01));
        assert_eq!(ledger.transactions("acct").len(), 1);
        assert_eq!(ledger.rejections("acct")[0].amount, dec!(0.05));

        let record = &sink.records()[0];
        assert!(!record.settled);
        assert_eq!(record.cost, dec!(0.05));
    }

    #[test]
    fn sink_failure_does_not_roll_back_debit() {
        let catalog = Arc::new(ProviderCatalog::with_providers(builtin_providers()).unwrap());
        let ledger = Arc::new(CreditLedger::new());
        ledger
            .credit("acct", dec!(1), CreditKind::Purchase, TransactionMeta::default())
            .unwrap();
        let settlement =
            UsageSettlement::new(catalog, Arc::clone(&ledger), Arc::new(MemoryUsageSink::failing()));
        let result = settlement
            .settle_target("acct", &target("openai", "gpt-4o", false), &CallOutcome::success(1_000, 0, 10))
            .unwrap();
        assert_eq!(result.cost, dec!(0.0025));
        assert_eq!(ledger.balance("acct"), dec!(0.9975));
    }

    #[test]
    fn unknown_target_cannot_be_priced() {
        let (settlement, ledger, sink) = setup(dec!(1));
        let err = settlement
            .settle_target("acct", &target("gone", "m", false), &CallOutcome::success(10, 10, 1))
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidCatalog(_)));
        assert_eq!(ledger.balance("acct"), dec!(1));
        assert!(!sink.records()[0].settled);
    }
}
