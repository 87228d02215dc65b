use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use leadpipe_core::config::UpstreamConfig;
use leadpipe_core::domain::cost::ModelTier;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to reach forward proxy: {0}")]
    Transport(String),
    #[error("forward proxy returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode generation response: {0}")]
    Decode(String),
    #[error("generation response contained no choices")]
    EmptyResponse,
    #[error("invalid upstream configuration: {0}")]
    Configuration(String),
}

/// One completed generation call: the text plus the metered token count.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens: u32,
}

/// Blocking-style single-attempt generation. No retry policy lives at this
/// layer; transport failures surface to the caller as [`UpstreamError`].
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion, UpstreamError>;
}

/// HTTP client for the metered forward proxy. The proxy receives the real
/// upstream as a `u` query parameter and relays the OpenAI-style chat
/// completion underneath, metering tokens against the forward token.
pub struct ForwardClient {
    http: reqwest::Client,
    endpoint: String,
    forward_token: secrecy::SecretString,
}

impl ForwardClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| UpstreamError::Configuration(error.to_string()))?;

        // The proxy relays everything after its own path to the target, so
        // the chat-completions path rides inside the `u` parameter.
        let endpoint = format!(
            "{}?u={}/chat/completions",
            config.base_url.trim_end_matches('/'),
            config.target_url.trim_end_matches('/')
        );

        Ok(Self { http, endpoint, forward_token: config.forward_token.clone() })
    }

    fn temperature_for(tier: ModelTier) -> f64 {
        // Research-style calls want determinism; short creative calls do not.
        match tier {
            ModelTier::Flagship => 0.3,
            ModelTier::Mini => 0.7,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// Rough fallback when the proxy strips usage metadata: four characters
/// per token, matching the upstream tokenizer's ballpark for English text.
fn estimate_tokens(text: &str) -> u32 {
    ((text.len() / 4).max(1)) as u32
}

#[async_trait]
impl GenerationClient for ForwardClient {
    async fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion, UpstreamError> {
        let body = json!({
            "model": tier.model_name(),
            "messages": [{"role": "user", "content": prompt}],
            "temperature": Self::temperature_for(tier),
        });

        debug!(model = tier.model_name(), "dispatching generation call via forward proxy");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.forward_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| UpstreamError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|error| UpstreamError::Decode(error.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(UpstreamError::EmptyResponse)?;

        let tokens = match parsed.usage {
            Some(usage) => usage.total_tokens,
            None => {
                warn!(model = tier.model_name(), "usage missing from response, estimating tokens");
                estimate_tokens(&text) + estimate_tokens(prompt)
            }
        };

        Ok(Completion { text, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::{estimate_tokens, ForwardClient};
    use leadpipe_core::config::UpstreamConfig;
    use leadpipe_core::domain::cost::ModelTier;

    fn upstream_config() -> UpstreamConfig {
        UpstreamConfig {
            forward_token: "test-token".into(),
            base_url: "https://api.lavapayments.com/v1/forward/".to_string(),
            target_url: "https://api.openai.com/v1/".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn endpoint_embeds_target_in_query_parameter() {
        let client = ForwardClient::new(&upstream_config()).expect("client");
        assert_eq!(
            client.endpoint,
            "https://api.lavapayments.com/v1/forward?u=https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn temperature_differs_by_tier() {
        assert!(ForwardClient::temperature_for(ModelTier::Flagship) < 0.5);
        assert!(ForwardClient::temperature_for(ModelTier::Mini) > 0.5);
    }

    #[test]
    fn token_estimate_never_reports_zero() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
