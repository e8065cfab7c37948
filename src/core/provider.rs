//! Provider and model descriptors.
//!
//! A provider owns one or more models. Prices are quoted per 1K tokens;
//! a model may override its provider's base price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::models::{Capabilities, Capability, LatencyClass, PowerLevel, Tier};

const THOUSAND: Decimal = Decimal::ONE_THOUSAND;

// =============================================================================
// Provider
// =============================================================================

/// A backend LLM provider as loaded from a catalog source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub display_name: String,
    /// Base cost per 1K input tokens.
    pub input_cost_per_1k: Decimal,
    /// Base cost per 1K output tokens.
    pub output_cost_per_1k: Decimal,
    pub max_context_tokens: u32,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub min_tier: Tier,
    /// Runs on local infrastructure: zero network cost, eligible for privacy routing.
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub latency_class: LatencyClass,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl Provider {
    /// Whether the provider is usable at `tier`.
    #[must_use]
    pub fn available_to(&self, tier: Tier) -> bool {
        self.min_tier <= tier
    }

    /// Whether `tokens` fits the provider's context window.
    #[must_use]
    pub const fn fits_context(&self, tokens: u32) -> bool {
        tokens <= self.max_context_tokens
    }

    /// Look up one of this provider's models.
    #[must_use]
    pub fn model(&self, model_id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == model_id)
    }
}

// =============================================================================
// Model
// =============================================================================

/// A model served by exactly one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cost_per_1k: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_cost_per_1k: Option<Decimal>,
    pub max_output_tokens: u32,
    /// Power-level affinity tag, used as a tie-break weight.
    #[serde(default)]
    pub affinity: PowerLevel,
    /// Relative quality score in `[0, 1]`.
    pub quality: f64,
    /// Capabilities on top of the provider's own.
    #[serde(default)]
    pub capabilities: Capabilities,
}

// =============================================================================
// Pricing
// =============================================================================

/// Effective per-1K prices for a provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl ModelPricing {
    /// Resolve the effective price of `model` on `provider`.
    ///
    /// Local providers are always free.
    #[must_use]
    pub fn resolve(provider: &Provider, model: &Model) -> Self {
        if provider.is_local {
            return Self::free();
        }
        Self {
            input_per_1k: model.input_cost_per_1k.unwrap_or(provider.input_cost_per_1k),
            output_per_1k: model
                .output_cost_per_1k
                .unwrap_or(provider.output_cost_per_1k),
        }
    }

    #[must_use]
    pub const fn free() -> Self {
        Self {
            input_per_1k: Decimal::ZERO,
            output_per_1k: Decimal::ZERO,
        }
    }

    /// Whether neither side of the price is charged.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.input_per_1k.is_zero() && self.output_per_1k.is_zero()
    }

    /// Cost of a call with the given token counts.
    #[must_use]
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> Decimal {
        let input = Decimal::from(prompt_tokens) / THOUSAND * self.input_per_1k;
        let output = Decimal::from(completion_tokens) / THOUSAND * self.output_per_1k;
        input + output
    }
}

/// Effective capabilities of a model (provider's plus its own).
#[must_use]
pub fn effective_capabilities(provider: &Provider, model: &Model) -> Capabilities {
    provider
        .capabilities
        .union(&model.capabilities)
        .copied()
        .collect()
}

/// Whether the model on this provider has `capability`.
#[must_use]
pub fn has_capability(provider: &Provider, model: &Model, capability: Capability) -> bool {
    provider.capabilities.contains(&capability) || model.capabilities.contains(&capability)
}

/// Lossy conversion used only for scoring.
#[must_use]
pub fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider(is_local: bool) -> Provider {
        Provider {
            id: "acme".to_string(),
            display_name: "Acme".to_string(),
            input_cost_per_1k: dec!(0.003),
            output_cost_per_1k: dec!(0.015),
            max_context_tokens: 8_000,
            capabilities: [Capability::Streaming].into_iter().collect(),
            min_tier: Tier::Starter,
            is_local,
            latency_class: LatencyClass::Fast,
            models: Vec::new(),
        }
    }

    fn model() -> Model {
        Model {
            id: "acme-large".to_string(),
            input_cost_per_1k: None,
            output_cost_per_1k: Some(dec!(0.020)),
            max_output_tokens: 4_096,
            affinity: PowerLevel::Precision,
            quality: 0.9,
            capabilities: [Capability::Code].into_iter().collect(),
        }
    }

    #[test]
    fn model_override_wins_over_provider_base() {
        let pricing = ModelPricing::resolve(&provider(false), &model());
        assert_eq!(pricing.input_per_1k, dec!(0.003));
        assert_eq!(pricing.output_per_1k, dec!(0.020));
    }

    #[test]
    fn local_provider_is_free() {
        let pricing = ModelPricing::resolve(&provider(true), &model());
        assert!(pricing.is_free());
        assert_eq!(pricing.cost(10_000, 10_000), Decimal::ZERO);
    }

    #[test]
    fn cost_is_per_thousand_tokens() {
        let pricing = ModelPricing {
            input_per_1k: dec!(0.003),
            output_per_1k: dec!(0.015),
        };
        // 2000 * 0.003/1000 + 1000 * 0.015/1000 = 0.006 + 0.015
        assert_eq!(pricing.cost(2_000, 1_000), dec!(0.021));
    }

    #[test]
    fn tier_and_context_checks() {
        let p = provider(false);
        assert!(!p.available_to(Tier::Free));
        assert!(p.available_to(Tier::Pro));
        assert!(p.fits_context(8_000));
        assert!(!p.fits_context(8_001));
    }

    #[test]
    fn capabilities_union_provider_and_model() {
        let p = provider(false);
        let m = model();
        let caps = effective_capabilities(&p, &m);
        assert!(caps.contains(&Capability::Streaming));
        assert!(caps.contains(&Capability::Code));
        assert!(has_capability(&p, &m, Capability::Code));
        assert!(!has_capability(&p, &m, Capability::Vision));
    }
}
