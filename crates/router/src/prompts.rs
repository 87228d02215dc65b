//! Prompt construction and response parsing for the three generation calls.

use serde::Deserialize;
use tracing::warn;

use leadpipe_core::domain::lead::{derived_profile, Lead, LeadPatch};

/// Research prompt for contact enrichment. Asks for strict JSON so the
/// response can flow straight into a lead patch.
pub fn enrichment_prompt(email: &str, context: Option<&str>) -> String {
    let known = context.unwrap_or("none recorded");
    format!(
        "You are a sales research assistant. Based on the email address {email} and any \
         known context, infer a plausible professional profile.\n\
         Known context: {known}\n\n\
         Respond with ONLY a JSON object, no prose, with exactly these string fields:\n\
         {{\"name\": ..., \"company\": ..., \"title\": ..., \"context\": ...}}\n\
         The context field is one sentence on engagement potential."
    )
}

/// Next-action prompt. The fifteen-word cap keeps suggestions actionable
/// enough to land in a notification.
pub fn suggestion_prompt(lead: &Lead) -> String {
    format!(
        "You are an expert sales strategist. Based on this lead's profile, suggest the \
         single best next action.\n\n\
         Lead: {} ({} @ {})\n\
         Context: {}\n\
         Stage: {}\n\n\
         Suggest ONE specific, actionable next step (max 15 words). Be creative and personalized.",
        lead.name.as_deref().unwrap_or("Unknown"),
        lead.title.as_deref().unwrap_or("Unknown title"),
        lead.company.as_deref().unwrap_or("unknown company"),
        lead.context.as_deref().unwrap_or("No context recorded."),
        lead.stage.as_str(),
    )
}

pub fn cold_email_prompt(lead: &Lead) -> String {
    format!(
        "You are a sales development representative writing a first-touch cold email.\n\n\
         Recipient: {} ({} @ {})\n\
         What we know: {}\n\n\
         Write a short, personalized cold email (under 120 words). Plain text, no subject \
         line, no placeholders. Reference what we know naturally and end with one clear ask.",
        lead.name.as_deref().unwrap_or("the recipient"),
        lead.title.as_deref().unwrap_or("Unknown title"),
        lead.company.as_deref().unwrap_or("their company"),
        lead.context.as_deref().unwrap_or("Nothing beyond the email address."),
    )
}

#[derive(Debug, Deserialize)]
struct EnrichmentProfile {
    name: Option<String>,
    company: Option<String>,
    title: Option<String>,
    context: Option<String>,
}

/// Parse the model's JSON profile into a lead patch. Models occasionally
/// wrap JSON in code fences or emit prose; anything unparseable falls back
/// to the deterministic profile derived from the email address.
pub fn parse_enrichment_profile(email: &str, response_text: &str) -> LeadPatch {
    let stripped = strip_code_fences(response_text);
    match serde_json::from_str::<EnrichmentProfile>(stripped) {
        Ok(profile) => LeadPatch {
            name: profile.name.filter(|s| !s.trim().is_empty()),
            company: profile.company.filter(|s| !s.trim().is_empty()),
            title: profile.title.filter(|s| !s.trim().is_empty()),
            context: profile.context.filter(|s| !s.trim().is_empty()),
            ..LeadPatch::default()
        },
        Err(error) => {
            warn!(%email, %error, "enrichment response was not valid JSON, using derived profile");
            derived_profile(email)
        }
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::{cold_email_prompt, parse_enrichment_profile, suggestion_prompt};
    use leadpipe_core::domain::lead::Lead;

    #[test]
    fn valid_json_profile_becomes_a_patch() {
        let patch = parse_enrichment_profile(
            "maria@acme.io",
            r#"{"name": "Maria Lopez", "company": "Acme", "title": "CTO", "context": "Scaling infra."}"#,
        );
        assert_eq!(patch.name.as_deref(), Some("Maria Lopez"));
        assert_eq!(patch.company.as_deref(), Some("Acme"));
        assert!(patch.stage.is_none(), "enrichment never moves the stage");
    }

    #[test]
    fn fenced_json_is_accepted() {
        let patch = parse_enrichment_profile(
            "maria@acme.io",
            "```json\n{\"name\": \"Maria\", \"company\": null, \"title\": null, \"context\": null}\n```",
        );
        assert_eq!(patch.name.as_deref(), Some("Maria"));
        assert!(patch.company.is_none());
    }

    #[test]
    fn prose_falls_back_to_derived_profile() {
        let patch = parse_enrichment_profile("maria@acme.io", "I could not find this person.");
        assert_eq!(patch.name.as_deref(), Some("Maria"));
        assert_eq!(patch.company.as_deref(), Some("Acme"));
        assert_eq!(patch.title.as_deref(), Some("Decision Maker"));
    }

    #[test]
    fn prompts_tolerate_sparse_leads() {
        let lead = Lead::new("bare@example.com");
        let suggestion = suggestion_prompt(&lead);
        assert!(suggestion.contains("Unknown"));
        let email = cold_email_prompt(&lead);
        assert!(email.contains("the recipient"));
    }
}
