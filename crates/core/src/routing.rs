//! Static operation→tier routing policy.
//!
//! Operations are classified at development time into "needs the flagship
//! model" vs "the mini model is enough". The table is plain data so the
//! policy can be inspected, overridden from config, and tested without any
//! HTTP involved. There is no feedback loop and no adaptive selection.

use serde::{Deserialize, Serialize};

use crate::domain::cost::{ModelTier, OperationKind};

/// Dollars per token, fixed per tier ($5/1M and $0.15/1M).
pub fn price_per_token(tier: ModelTier) -> f64 {
    match tier {
        ModelTier::Flagship => 0.000_005,
        ModelTier::Mini => 0.000_000_15,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RoutingPolicy {
    pub enrichment: ModelTier,
    pub email_draft: ModelTier,
    pub suggestion: ModelTier,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            enrichment: ModelTier::Flagship,
            email_draft: ModelTier::Flagship,
            suggestion: ModelTier::Mini,
        }
    }
}

impl RoutingPolicy {
    pub fn tier_for(&self, operation: OperationKind) -> ModelTier {
        match operation {
            OperationKind::Enrichment => self.enrichment,
            OperationKind::EmailDraft => self.email_draft,
            OperationKind::Suggestion => self.suggestion,
        }
    }

    /// Price a completed call: `tokens × price_per_token(tier)`.
    pub fn cost_of(&self, operation: OperationKind, tokens: u32) -> f64 {
        f64::from(tokens) * price_per_token(self.tier_for(operation))
    }
}
