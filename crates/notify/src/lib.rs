//! Outbound notifications to the Poke messaging webhook.
//!
//! Delivery is best-effort by contract: a failed or slow send is logged and
//! swallowed, and never fails the pipeline operation that triggered it.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use leadpipe_core::config::PokeConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to reach messaging webhook: {0}")]
    Transport(String),
    #[error("messaging webhook returned status {0}")]
    Status(u16),
    #[error("invalid messaging configuration: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// HTTP notifier for the Poke inbound-SMS webhook.
pub struct PokeClient {
    http: reqwest::Client,
    webhook_url: String,
    api_key: secrecy::SecretString,
}

impl PokeClient {
    pub fn new(config: &PokeConfig) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| NotifyError::Configuration(error.to_string()))?;

        let webhook_url =
            format!("{}/inbound-sms/webhook", config.base_url.trim_end_matches('/'));

        Ok(Self { http, webhook_url, api_key: config.api_key.clone() })
    }
}

#[async_trait]
impl Notifier for PokeClient {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!(chars = message.len(), "notification delivered");
        Ok(())
    }
}

/// Notifier that records nothing and always succeeds. Used when messaging
/// is not configured and in tests that do not care about notifications.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Fire a notification without letting its outcome affect the caller.
pub async fn send_best_effort(notifier: &dyn Notifier, message: &str) {
    if let Err(error) = notifier.notify(message).await {
        warn!(%error, "notification dropped");
    }
}

pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{Notifier, NotifyError};

    /// Recording notifier for tests. Optionally fails every send to prove
    /// callers treat delivery as best-effort.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail: true }
        }

        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().expect("sent poisoned").clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Status(500));
            }
            self.sent.lock().expect("sent poisoned").push(message.to_string());
            Ok(())
        }
    }
}
