//! Test fixtures and factory functions for integration tests.
//!
//! ```rust,ignore
//! use common::fixtures::*;
//!
//! let world = World::new(scenario_providers());
//! world.ledger.credit("alice", dec!(5), CreditKind::Purchase, TransactionMeta::default())?;
//! let decision = world.engine.select_provider(&pro_request("alice"), &HashSet::new())?;
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

pub use llmroute::core::{
    CacheKey, CallOutcome, Capability, CascadeStep, CreditKind, CreditLedger, DecisionCache,
    HealthMonitor, HealthPolicy, HealthStatus, LatencyClass, LatencyRequirement, MemoryUsageSink,
    Model, PowerLevel, Provider, ProviderCatalog, QualityRequirement, RoutingEngine,
    RoutingPolicy, RoutingRequest, TaskType, Tier, TransactionMeta, UsageSettlement, UsageSink,
};
pub use llmroute::test_utils::{make_test_local_provider, make_test_model, make_test_provider};

/// A fully wired set of components sharing one catalog, monitor and ledger.
pub struct World {
    pub catalog: Arc<ProviderCatalog>,
    pub health: Arc<HealthMonitor>,
    pub ledger: Arc<CreditLedger>,
    pub cache: Arc<DecisionCache>,
    pub engine: RoutingEngine,
    pub sink: Arc<MemoryUsageSink>,
    pub settlement: UsageSettlement,
}

impl World {
    pub fn new(providers: Vec<Provider>) -> Self {
        Self::with_ledger(providers, Arc::new(CreditLedger::new()))
    }

    pub fn with_ledger(providers: Vec<Provider>, ledger: Arc<CreditLedger>) -> Self {
        let catalog = Arc::new(ProviderCatalog::with_providers(providers).expect("valid catalog"));
        let health = Arc::new(HealthMonitor::new(HealthPolicy::default()));
        let cache = Arc::new(DecisionCache::default());
        let engine = RoutingEngine::new(
            Arc::clone(&catalog),
            Arc::clone(&health),
            Arc::clone(&ledger),
            Arc::clone(&cache),
            RoutingPolicy::default(),
        );
        let sink = Arc::new(MemoryUsageSink::new());
        let settlement = UsageSettlement::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&sink) as Arc<dyn UsageSink>,
        );
        Self {
            catalog,
            health,
            ledger,
            cache,
            engine,
            sink,
            settlement,
        }
    }

    /// Fund `account` with a purchase.
    pub fn fund(&self, account: &str, amount: Decimal) {
        self.ledger
            .credit(account, amount, CreditKind::Purchase, TransactionMeta::default())
            .expect("fund account");
    }

    /// Drive `provider` down with consecutive failures.
    pub fn take_down(&self, provider: &str) {
        for _ in 0..self.health.policy().failure_threshold {
            self.health.record(provider, 5_000, false);
        }
        assert_eq!(self.health.status(provider), Some(HealthStatus::Down));
    }
}

/// Provider with an explicit price and a single model.
pub fn priced_provider(
    id: &str,
    input: Decimal,
    output: Decimal,
    latency: LatencyClass,
    min_tier: Tier,
    model: Model,
) -> Provider {
    Provider {
        input_cost_per_1k: input,
        output_cost_per_1k: output,
        models: vec![model],
        ..make_test_provider(id, min_tier, latency)
    }
}

/// A small mixed catalog:
///
/// - `local`: free, local, fast, eco model `local-small` (quality 0.5)
/// - `budget`: cheap paid, normal latency, eco model `budget-mini` (quality 0.65)
/// - `swift`: paid, instant latency, balanced `swift-turbo` (quality 0.75)
/// - `sage`: expensive, slow, code-capable precision `sage-max` (quality 0.95)
pub fn scenario_providers() -> Vec<Provider> {
    use rust_decimal_macros::dec;

    let mut sage_model = make_test_model("sage-max", 0.95, PowerLevel::Precision);
    sage_model.capabilities.insert(Capability::Code);
    sage_model.max_output_tokens = 8_192;

    vec![
        Provider {
            models: vec![make_test_model("local-small", 0.5, PowerLevel::Eco)],
            ..make_test_local_provider("local")
        },
        priced_provider(
            "budget",
            dec!(0.0002),
            dec!(0.0004),
            LatencyClass::Normal,
            Tier::Starter,
            make_test_model("budget-mini", 0.65, PowerLevel::Eco),
        ),
        priced_provider(
            "swift",
            dec!(0.001),
            dec!(0.002),
            LatencyClass::Instant,
            Tier::Starter,
            make_test_model("swift-turbo", 0.75, PowerLevel::Balanced),
        ),
        priced_provider(
            "sage",
            dec!(0.01),
            dec!(0.03),
            LatencyClass::Slow,
            Tier::Pro,
            sage_model,
        ),
    ]
}

/// A pro-tier chat request for `account` with generous credits.
pub fn pro_request(account: &str) -> RoutingRequest {
    use rust_decimal_macros::dec;

    RoutingRequest::new(account, TaskType::Chat, 2_000)
        .with_tier(Tier::Pro)
        .with_credits(dec!(100))
}
