use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The billable operations recognized by the cost ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Enrichment,
    Suggestion,
    EmailDraft,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrichment => "enrichment",
            Self::Suggestion => "suggestion",
            Self::EmailDraft => "email_draft",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enrichment" => Some(Self::Enrichment),
            "suggestion" | "suggest_action" => Some(Self::Suggestion),
            "email_draft" | "draft_cold_email" => Some(Self::EmailDraft),
            _ => None,
        }
    }
}

/// Fixed price/capability class of the upstream generation model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Flagship,
    Mini,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flagship => "flagship",
            Self::Mini => "mini",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flagship" => Some(Self::Flagship),
            "mini" => Some(Self::Mini),
            _ => None,
        }
    }

    /// Upstream model identifier sent on the wire.
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::Flagship => "gpt-4o",
            Self::Mini => "gpt-4o-mini",
        }
    }
}

/// One billed external call. Append-only: entries are written exactly once
/// and never mutated. `lead_email` is a non-owning reference; no cascade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub operation: OperationKind,
    pub tier: ModelTier,
    pub tokens: u32,
    pub cost: f64,
    pub lead_email: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(
        operation: OperationKind,
        tier: ModelTier,
        tokens: u32,
        cost: f64,
        lead_email: Option<String>,
    ) -> Self {
        Self { operation, tier, tokens, cost, lead_email, recorded_at: Utc::now() }
    }
}

/// Optional narrowing applied to ledger aggregation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostFilter {
    pub lead_email: Option<String>,
    pub operation: Option<OperationKind>,
}

#[cfg(test)]
mod tests {
    use super::{ModelTier, OperationKind};

    #[test]
    fn operation_kind_round_trips() {
        for kind in [OperationKind::Enrichment, OperationKind::Suggestion, OperationKind::EmailDraft]
        {
            assert_eq!(OperationKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn operation_kind_accepts_tool_aliases() {
        assert_eq!(OperationKind::parse("suggest_action"), Some(OperationKind::Suggestion));
        assert_eq!(OperationKind::parse("draft_cold_email"), Some(OperationKind::EmailDraft));
        assert_eq!(OperationKind::parse("ocr"), None);
    }

    #[test]
    fn tiers_map_to_upstream_models() {
        assert_eq!(ModelTier::Flagship.model_name(), "gpt-4o");
        assert_eq!(ModelTier::Mini.model_name(), "gpt-4o-mini");
    }
}
