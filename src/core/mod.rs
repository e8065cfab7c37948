//! Routing core: catalog, health, ledger, cache, routing and settlement.

pub mod cache;
pub mod catalog;
pub mod collaborators;
pub mod executor;
pub mod health;
pub mod ledger;
pub(crate) mod locks;
pub mod logging;
pub mod models;
pub mod provider;
pub mod routing;
pub mod settlement;

pub use cache::{CacheKey, CacheStats, CacheStatsSnapshot, DecisionCache, token_bucket};
pub use catalog::{
    BuiltinCatalog, CatalogSnapshot, CatalogSource, FileCatalog, ProviderCatalog, StaticCatalog,
    builtin_providers, spawn_refresh_loop, validate_providers,
};
pub use collaborators::{
    ByokKeyStore, ChatMessage, CompletionClient, CompletionResponse, IdentityLookup,
    IdentityProfile, MemoryUsageSink, StaticByokStore, StaticIdentity, TracingUsageSink,
    UsageRecord, UsageSink,
};
pub use executor::{Attempt, ExecutionReport, FallbackExecutor};
pub use health::{
    HealthMonitor, HealthPolicy, HealthProbe, HealthRecord, HealthStatus, ProbeLoopHandle,
    ProbeOutcome,
};
pub use ledger::{
    CreditAccount, CreditKind, CreditLedger, JournalContents, LedgerReceipt, RejectedDebit,
    RejectionReason, Transaction, TransactionJournal, TransactionKind, TransactionMeta,
};
pub use models::{
    Capabilities, Capability, CascadeStep, LatencyClass, LatencyRequirement, PowerLevel,
    QualityRequirement, RouteTarget, RoutingDecision, RoutingRequest, TaskType, Tier,
};
pub use provider::{Model, ModelPricing, Provider};
pub use routing::{RoutingEngine, RoutingPolicy, effective_latency_ms};
pub use settlement::{CallOutcome, Settlement, UsageSettlement};
