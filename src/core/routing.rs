//! Provider selection.
//!
//! `select_provider` walks a fixed cascade; the first step whose
//! precondition holds decides the candidate pool:
//!
//! 1. privacy: local providers only, never falls through
//! 2. BYOK: providers the caller holds a key for, at zero cost
//! 3. instant: providers under the latency ceiling, falls through when empty
//! 4. budget: zero-cost providers when the account is on the free tier or
//!    cannot afford the cheapest paid option
//! 5. task affinity: narrows the affordable pool, keeps it when nothing matches
//! 6. default: every affordable eligible model
//!
//! The pool is then ranked by the request's power level; the winner becomes
//! the primary target and the next ranked entries form the fallback chain.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use super::cache::{CacheKey, DecisionCache};
use super::catalog::{CatalogSnapshot, ProviderCatalog};
use super::health::{HealthMonitor, HealthRecord, HealthStatus};
use super::ledger::CreditLedger;
use super::models::{
    Capability, CascadeStep, LatencyRequirement, PowerLevel, RouteTarget, RoutingDecision,
    RoutingRequest, TaskType, Tier,
};
use super::provider::{Model, ModelPricing, Provider, decimal_to_f64, has_capability};
use crate::error::{Result, RouterError};

const COST_EPSILON: f64 = 1e-6;

// =============================================================================
// Policy
// =============================================================================

/// Tunables for the routing cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPolicy {
    /// Providers must be strictly faster than this for the instant step.
    pub instant_latency_ceiling_ms: u64,
    /// Length of the fallback chain.
    pub max_fallbacks: usize,
    /// Precision routing prefers models whose estimated cost stays below this.
    pub precision_cost_ceiling: Decimal,
    /// Share of the token estimate assumed to be completion tokens.
    pub output_token_ratio: f64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            instant_latency_ceiling_ms: 500,
            max_fallbacks: 3,
            precision_cost_ceiling: Decimal::ONE,
            output_token_ratio: 0.25,
        }
    }
}

impl RoutingPolicy {
    /// Split a total token estimate into (prompt, completion) for `model`.
    #[must_use]
    pub fn split_tokens(&self, estimated_tokens: u32, model: &Model) -> (u32, u32) {
        let ratio = self.output_token_ratio.clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let completion = (f64::from(estimated_tokens) * ratio).round() as u32;
        let completion = completion.min(estimated_tokens);
        let prompt = estimated_tokens - completion;
        (prompt, completion.min(model.max_output_tokens))
    }

    /// Estimated platform cost of running `estimated_tokens` on `model`.
    #[must_use]
    pub fn estimate_cost(&self, provider: &Provider, model: &Model, estimated_tokens: u32) -> Decimal {
        let (prompt, completion) = self.split_tokens(estimated_tokens, model);
        ModelPricing::resolve(provider, model).cost(prompt, completion)
    }
}

// =============================================================================
// Candidates
// =============================================================================

#[derive(Debug, Clone)]
struct Candidate<'a> {
    provider: &'a Provider,
    model: &'a Model,
    /// Estimated platform cost for this request.
    cost: Decimal,
    latency_ms: f64,
    /// 0 for healthy or never-probed providers, 1 for degraded ones.
    health_rank: u8,
    zero_cost: bool,
    byok: bool,
    score: f64,
}

impl Candidate<'_> {
    /// Cost the caller will actually be charged.
    fn charged(&self) -> Decimal {
        if self.byok || self.zero_cost {
            Decimal::ZERO
        } else {
            self.cost
        }
    }

    fn target(&self) -> RouteTarget {
        RouteTarget {
            provider_id: self.provider.id.clone(),
            model_id: self.model.id.clone(),
            estimated_cost: self.charged(),
            byok: self.byok,
        }
    }

    fn describe(&self) -> String {
        format!(
            "{}/{} (quality {:.2}, est. cost {}, latency {:.0}ms)",
            self.provider.id,
            self.model.id,
            self.model.quality,
            self.charged(),
            self.latency_ms
        )
    }
}

/// Latency used for ranking: health EWMA when known, else the catalog class.
#[must_use]
pub fn effective_latency_ms(provider: &Provider, record: Option<&HealthRecord>) -> f64 {
    record
        .and_then(|r| r.avg_latency_ms)
        .unwrap_or_else(|| provider.latency_class.nominal_ms() as f64)
}

struct Pool<'a> {
    step: CascadeStep,
    reason: String,
    candidates: Vec<Candidate<'a>>,
}

// =============================================================================
// Engine
// =============================================================================

/// Selects a provider and fallback chain for a request.
///
/// Performs no I/O: catalog, health and cache are all read from memory.
#[derive(Debug)]
pub struct RoutingEngine {
    catalog: Arc<ProviderCatalog>,
    health: Arc<HealthMonitor>,
    ledger: Arc<CreditLedger>,
    cache: Arc<DecisionCache>,
    policy: RoutingPolicy,
}

impl RoutingEngine {
    #[must_use]
    pub const fn new(
        catalog: Arc<ProviderCatalog>,
        health: Arc<HealthMonitor>,
        ledger: Arc<CreditLedger>,
        cache: Arc<DecisionCache>,
        policy: RoutingPolicy,
    ) -> Self {
        Self {
            catalog,
            health,
            ledger,
            cache,
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<DecisionCache> {
        &self.cache
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    #[must_use]
    pub const fn ledger(&self) -> &Arc<CreditLedger> {
        &self.ledger
    }

    /// Credits available to the request: the ledger balance when the account
    /// exists there, otherwise the request's own snapshot.
    #[must_use]
    pub fn available_credits(&self, request: &RoutingRequest) -> Decimal {
        if self.ledger.contains(&request.account_id) {
            self.ledger.balance(&request.account_id)
        } else {
            request.credits_remaining
        }
    }

    /// Choose a primary target and fallback chain for `request`.
    ///
    /// `byok_keys` is merged with the request's own BYOK list.
    ///
    /// # Errors
    /// Returns `NoProviderAvailable` when the cascade yields an empty pool.
    pub fn select_provider(
        &self,
        request: &RoutingRequest,
        byok_keys: &HashSet<String>,
    ) -> Result<RoutingDecision> {
        let snapshot = self.catalog.snapshot();
        let health = self.health.snapshot();
        let credits = self.available_credits(request);
        let byok: BTreeSet<String> = request
            .byok_providers
            .iter()
            .chain(byok_keys.iter())
            .cloned()
            .collect();

        if snapshot.is_empty() {
            return Err(no_provider("catalog is empty"));
        }

        let candidates = self.eligible(&snapshot, &health, request, &byok);
        let budget_constrained = is_budget_constrained(request.tier, &candidates, credits);
        let key = CacheKey::new(request, &byok, budget_constrained);

        if let Some(cached) = self.cache.get(&key)
            && let Some(decision) = self.revalidate(cached, &snapshot, &health, request, &byok, credits)
        {
            tracing::debug!(
                account = %request.account_id,
                provider = %decision.provider_id(),
                model = %decision.model_id(),
                "Routing decision served from cache"
            );
            return Ok(decision);
        }

        if candidates.is_empty() {
            return Err(no_provider(&describe_ineligible(&snapshot, &health, request)));
        }

        let pool = self.cascade(request, candidates, &byok, budget_constrained, credits)?;
        let decision = self.decide(request, pool, credits)?;

        tracing::debug!(
            account = %request.account_id,
            task = %request.task_type,
            power = %request.power_level,
            provider = %decision.provider_id(),
            model = %decision.model_id(),
            cost = %decision.estimated_cost(),
            fallbacks = decision.fallbacks.len(),
            justification = %decision.justification,
            "Routing decision"
        );

        self.cache.insert(key, decision.clone());
        Ok(decision)
    }

    /// Every (provider, model) pair passing tier, context and health checks.
    fn eligible<'a>(
        &self,
        snapshot: &'a CatalogSnapshot,
        health: &HashMap<String, HealthRecord>,
        request: &RoutingRequest,
        byok: &BTreeSet<String>,
    ) -> Vec<Candidate<'a>> {
        snapshot
            .candidates()
            .filter(|(provider, _)| {
                provider.available_to(request.tier)
                    && provider.fits_context(request.estimated_tokens)
            })
            .filter_map(|(provider, model)| {
                let record = health.get(&provider.id);
                let health_rank = match record.map(|r| r.status) {
                    Some(HealthStatus::Down) => return None,
                    Some(HealthStatus::Degraded) => 1,
                    Some(HealthStatus::Healthy) | None => 0,
                };
                let pricing = ModelPricing::resolve(provider, model);
                Some(Candidate {
                    provider,
                    model,
                    cost: self.policy.estimate_cost(provider, model, request.estimated_tokens),
                    latency_ms: effective_latency_ms(provider, record),
                    health_rank,
                    zero_cost: pricing.is_free(),
                    byok: byok.contains(&provider.id),
                    score: 0.0,
                })
            })
            .collect()
    }

    fn cascade<'a>(
        &self,
        request: &RoutingRequest,
        candidates: Vec<Candidate<'a>>,
        byok: &BTreeSet<String>,
        budget_constrained: bool,
        credits: Decimal,
    ) -> Result<Pool<'a>> {
        if request.privacy_required {
            let local: Vec<_> = candidates
                .into_iter()
                .filter(|c| c.provider.is_local)
                .map(|c| Candidate { byok: false, ..c })
                .collect();
            if local.is_empty() {
                return Err(no_provider(
                    "privacy required but no eligible local provider is available",
                ));
            }
            return Ok(Pool {
                step: CascadeStep::Privacy,
                reason: "privacy required: local providers only".to_string(),
                candidates: local,
            });
        }

        if !byok.is_empty() {
            let owned: Vec<_> = candidates.iter().filter(|c| c.byok).cloned().collect();
            if !owned.is_empty() {
                return Ok(Pool {
                    step: CascadeStep::Byok,
                    reason: format!(
                        "BYOK key held for {}",
                        byok.iter().cloned().collect::<Vec<_>>().join(", ")
                    ),
                    candidates: owned,
                });
            }
        }

        let affordable = |c: &Candidate<'_>| c.zero_cost || c.cost <= credits;
        let spendable = |c: &Candidate<'_>| {
            if budget_constrained {
                c.zero_cost
            } else {
                affordable(c)
            }
        };

        if request.latency == LatencyRequirement::Instant {
            let ceiling = self.policy.instant_latency_ceiling_ms as f64;
            let fast: Vec<_> = candidates
                .iter()
                .filter(|c| c.latency_ms < ceiling && spendable(*c))
                .cloned()
                .collect();
            if fast.is_empty() {
                tracing::debug!(
                    ceiling_ms = self.policy.instant_latency_ceiling_ms,
                    "No provider under the instant latency ceiling; falling through"
                );
            } else {
                return Ok(Pool {
                    step: CascadeStep::Instant,
                    reason: format!(
                        "instant latency: under {}ms",
                        self.policy.instant_latency_ceiling_ms
                    ),
                    candidates: fast,
                });
            }
        }

        if budget_constrained {
            let free: Vec<_> = candidates.into_iter().filter(|c| c.zero_cost).collect();
            if free.is_empty() {
                return Err(no_provider(&format!(
                    "{} and no zero-cost provider is available",
                    budget_reason(request.tier)
                )));
            }
            return Ok(Pool {
                step: CascadeStep::Budget,
                reason: format!("{}: zero-cost providers only", budget_reason(request.tier)),
                candidates: free,
            });
        }

        let base: Vec<_> = candidates.into_iter().filter(|c| affordable(c)).collect();
        if base.is_empty() {
            return Err(no_provider("no eligible provider is affordable"));
        }

        let (narrowed, preference) = narrow_by_task(request.task_type, &base);
        if !narrowed.is_empty() && narrowed.len() < base.len() {
            return Ok(Pool {
                step: CascadeStep::TaskAffinity,
                reason: format!("{} task prefers {preference}", request.task_type),
                candidates: narrowed,
            });
        }

        Ok(Pool {
            step: CascadeStep::Default,
            reason: "all eligible providers".to_string(),
            candidates: base,
        })
    }

    fn decide(
        &self,
        request: &RoutingRequest,
        mut pool: Pool<'_>,
        credits: Decimal,
    ) -> Result<RoutingDecision> {
        let ceiling = self.policy.precision_cost_ceiling;
        rank(&mut pool.candidates, request, ceiling);

        let pool_size = pool.candidates.len();
        let mut ranked = pool.candidates.into_iter();
        let best = ranked
            .next()
            .ok_or_else(|| no_provider("candidate pool is empty"))?;
        let (primary, summary) = (best.target(), best.describe());
        let fallbacks: Vec<RouteTarget> = ranked
            .map(|c| c.target())
            .filter(|t| !t.same_route(&primary))
            .take(self.policy.max_fallbacks)
            .collect();

        let justification = justify(
            pool.step,
            &format!("{}; pool={pool_size}", pool.reason),
            request,
            credits,
            &summary,
            fallbacks.len(),
        );

        Ok(RoutingDecision {
            primary,
            fallbacks,
            cascade_step: pool.step,
            justification,
            cache_hit: false,
            decided_at: Utc::now(),
        })
    }

    /// Re-check a cached decision against current state, recomputing costs.
    ///
    /// Returns `None` when the primary target no longer qualifies.
    fn revalidate(
        &self,
        cached: RoutingDecision,
        snapshot: &CatalogSnapshot,
        health: &HashMap<String, HealthRecord>,
        request: &RoutingRequest,
        byok: &BTreeSet<String>,
        credits: Decimal,
    ) -> Option<RoutingDecision> {
        let refresh = |target: &RouteTarget| -> Option<RouteTarget> {
            let (provider, model) = snapshot.model(&target.provider_id, &target.model_id)?;
            let down = health
                .get(&provider.id)
                .is_some_and(|r| r.status == HealthStatus::Down);
            if down
                || !provider.available_to(request.tier)
                || !provider.fits_context(request.estimated_tokens)
                || (request.privacy_required && !provider.is_local)
                || (target.byok && !byok.contains(&provider.id))
            {
                return None;
            }
            let free = target.byok || ModelPricing::resolve(provider, model).is_free();
            let estimated_cost = if free {
                Decimal::ZERO
            } else {
                self.policy
                    .estimate_cost(provider, model, request.estimated_tokens)
            };
            Some(RouteTarget {
                estimated_cost,
                ..target.clone()
            })
        };

        let primary = refresh(&cached.primary)?;
        if primary.estimated_cost > credits {
            tracing::trace!(
                provider = %primary.provider_id,
                cost = %primary.estimated_cost,
                credits = %credits,
                "Cached primary no longer affordable"
            );
            return None;
        }
        let fallbacks: Vec<RouteTarget> = cached
            .fallbacks
            .iter()
            .filter_map(refresh)
            .filter(|t| t.estimated_cost <= credits)
            .collect();
        let chosen = format!(
            "{}/{} (est. cost {})",
            primary.provider_id, primary.model_id, primary.estimated_cost
        );
        let justification = justify(
            cached.cascade_step,
            "cached route",
            request,
            credits,
            &chosen,
            fallbacks.len(),
        );

        Some(RoutingDecision {
            primary,
            fallbacks,
            cascade_step: cached.cascade_step,
            justification,
            cache_hit: true,
            decided_at: Utc::now(),
        })
    }
}

// =============================================================================
// Cascade helpers
// =============================================================================

fn no_provider(reason: &str) -> RouterError {
    tracing::debug!(reason, "No provider available");
    RouterError::NoProviderAvailable {
        reason: reason.to_string(),
    }
}

/// Free tier, or credits below the cheapest paid option.
fn is_budget_constrained(tier: Tier, candidates: &[Candidate<'_>], credits: Decimal) -> bool {
    if tier == Tier::Free {
        return true;
    }
    candidates
        .iter()
        .filter(|c| !c.zero_cost && !c.byok)
        .map(|c| c.cost)
        .min()
        .is_some_and(|cheapest| credits < cheapest)
}

fn budget_reason(tier: Tier) -> &'static str {
    if tier == Tier::Free {
        "free tier"
    } else {
        "insufficient balance"
    }
}

/// Justification text. Only `credits` and `chosen` carry per-request numbers,
/// so a cache hit rebuilds it from the caller's own balance.
fn justify(
    step: CascadeStep,
    basis: &str,
    request: &RoutingRequest,
    credits: Decimal,
    chosen: &str,
    fallbacks: usize,
) -> String {
    format!(
        "step={} ({basis}); power={} quality>={:.1}; credits={credits}; chose {chosen}; {fallbacks} fallback(s)",
        step.as_str(),
        request.power_level,
        request.quality.floor(),
    )
}

fn describe_ineligible(
    snapshot: &CatalogSnapshot,
    health: &HashMap<String, HealthRecord>,
    request: &RoutingRequest,
) -> String {
    let by_tier: Vec<_> = snapshot.for_tier(request.tier).collect();
    if by_tier.is_empty() {
        return format!("no provider available to tier {}", request.tier);
    }
    let fitting: Vec<_> = by_tier
        .into_iter()
        .filter(|p| p.fits_context(request.estimated_tokens))
        .collect();
    if fitting.is_empty() {
        return format!(
            "no provider fits {} tokens at tier {}",
            request.estimated_tokens, request.tier
        );
    }
    let down = fitting
        .iter()
        .filter(|p| {
            health
                .get(&p.id)
                .is_some_and(|r| r.status == HealthStatus::Down)
        })
        .count();
    format!("all {down} eligible provider(s) are down")
}

/// Apply the task's preference; returns the narrowed pool and a label.
fn narrow_by_task<'a>(task: TaskType, base: &[Candidate<'a>]) -> (Vec<Candidate<'a>>, String) {
    let by_affinity = |order: &[PowerLevel]| -> (Vec<Candidate<'a>>, String) {
        for level in order {
            let matched: Vec<_> = base
                .iter()
                .filter(|c| c.model.affinity == *level)
                .cloned()
                .collect();
            if !matched.is_empty() {
                return (matched, format!("{level} models"));
            }
        }
        (Vec::new(), String::new())
    };

    match task {
        TaskType::Code => (
            base.iter()
                .filter(|c| has_capability(c.provider, c.model, Capability::Code))
                .cloned()
                .collect(),
            "code capability".to_string(),
        ),
        TaskType::Rag => {
            let largest = base
                .iter()
                .map(|c| c.provider.max_context_tokens)
                .max()
                .unwrap_or(0);
            (
                base.iter()
                    .filter(|c| c.provider.max_context_tokens >= largest / 2)
                    .cloned()
                    .collect(),
                "the largest context windows".to_string(),
            )
        }
        TaskType::Analysis => by_affinity(&[PowerLevel::Precision, PowerLevel::Balanced]),
        TaskType::Creative => by_affinity(&[PowerLevel::Balanced, PowerLevel::Precision]),
        TaskType::Chat => (
            base.iter()
                .filter(|c| has_capability(c.provider, c.model, Capability::Streaming))
                .cloned()
                .collect(),
            "streaming".to_string(),
        ),
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// Sort `pool` best-first for the request's power level.
///
/// Degraded providers always rank after healthy or unknown ones. Within a
/// health class:
/// - eco: models meeting the quality floor first, then cheapest
/// - balanced: models meeting the floor first, then the equal-weight mean of
///   normalized quality, inverse cost and inverse latency
/// - precision: models within the cost ceiling first, then highest quality
///
/// Ties fall back to the model's power-level affinity, then ids.
fn rank(pool: &mut [Candidate<'_>], request: &RoutingRequest, cost_ceiling: Decimal) {
    let floor = request.quality.floor();
    let power = request.power_level;

    if power == PowerLevel::Balanced {
        let max_quality = pool
            .iter()
            .map(|c| c.model.quality)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);
        let min_cost = pool
            .iter()
            .map(|c| decimal_to_f64(c.charged()))
            .fold(f64::INFINITY, f64::min);
        let min_latency = pool
            .iter()
            .map(|c| c.latency_ms.max(1.0))
            .fold(f64::INFINITY, f64::min);

        for c in pool.iter_mut() {
            let quality = c.model.quality / max_quality;
            let cost = (min_cost + COST_EPSILON) / (decimal_to_f64(c.charged()) + COST_EPSILON);
            let speed = min_latency / c.latency_ms.max(1.0);
            c.score = (quality + cost + speed) / 3.0;
        }
    }

    pool.sort_by(|a, b| {
        a.health_rank
            .cmp(&b.health_rank)
            .then_with(|| compare_for_power(a, b, power, floor, cost_ceiling))
            .then_with(|| affinity_rank(a, power).cmp(&affinity_rank(b, power)))
            .then_with(|| a.provider.id.cmp(&b.provider.id))
            .then_with(|| a.model.id.cmp(&b.model.id))
    });
}

fn compare_for_power(
    a: &Candidate<'_>,
    b: &Candidate<'_>,
    power: PowerLevel,
    floor: f64,
    cost_ceiling: Decimal,
) -> Ordering {
    let below_floor = |c: &Candidate<'_>| c.model.quality < floor;
    match power {
        PowerLevel::Eco => below_floor(a)
            .cmp(&below_floor(b))
            .then_with(|| a.charged().cmp(&b.charged()))
            .then_with(|| b.model.quality.total_cmp(&a.model.quality))
            .then_with(|| a.latency_ms.total_cmp(&b.latency_ms)),
        PowerLevel::Balanced => below_floor(a)
            .cmp(&below_floor(b))
            .then_with(|| b.score.total_cmp(&a.score)),
        PowerLevel::Precision => {
            let over = |c: &Candidate<'_>| c.charged() > cost_ceiling;
            over(a)
                .cmp(&over(b))
                .then_with(|| b.model.quality.total_cmp(&a.model.quality))
                .then_with(|| a.charged().cmp(&b.charged()))
        }
    }
}

fn affinity_rank(c: &Candidate<'_>, power: PowerLevel) -> u8 {
    u8::from(c.model.affinity != power)
}
