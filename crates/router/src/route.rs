use std::sync::Arc;

use tracing::info;

use leadpipe_core::domain::cost::{ModelTier, OperationKind};
use leadpipe_core::routing::RoutingPolicy;

use crate::client::{GenerationClient, UpstreamError};

/// Outcome of one routed generation call, ready for ledger persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutedResponse {
    pub text: String,
    pub tokens: u32,
    pub tier: ModelTier,
    pub cost: f64,
}

/// Applies the static operation→tier mapping, issues exactly one upstream
/// call, and prices the metered tokens. Persisting the cost is the caller's
/// job; the router itself holds no database handle.
pub struct CostRouter {
    client: Arc<dyn GenerationClient>,
    policy: RoutingPolicy,
}

impl CostRouter {
    pub fn new(client: Arc<dyn GenerationClient>, policy: RoutingPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub async fn route(
        &self,
        operation: OperationKind,
        prompt: &str,
    ) -> Result<RoutedResponse, UpstreamError> {
        let tier = self.policy.tier_for(operation);
        let completion = self.client.complete(tier, prompt).await?;
        let cost = self.policy.cost_of(operation, completion.tokens);

        info!(
            operation = operation.as_str(),
            model = tier.model_name(),
            tokens = completion.tokens,
            cost = format!("{cost:.6}"),
            "routed generation call"
        );

        Ok(RoutedResponse { text: completion.text, tokens: completion.tokens, tier, cost })
    }
}

/// Scripted doubles shared by this crate's tests and downstream consumers.
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use leadpipe_core::domain::cost::ModelTier;

    use crate::client::{Completion, GenerationClient, UpstreamError};

    /// Scripted generation client: pops one canned outcome per call and
    /// records which tier each call asked for.
    #[derive(Default)]
    pub struct ScriptedClient {
        script: Mutex<VecDeque<Result<Completion, UpstreamError>>>,
        pub calls: Mutex<Vec<ModelTier>>,
    }

    impl ScriptedClient {
        pub fn with_responses(
            responses: impl IntoIterator<Item = Result<Completion, UpstreamError>>,
        ) -> Self {
            Self {
                script: Mutex::new(responses.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str, tokens: u32) -> Self {
            Self::with_responses([Ok(Completion { text: text.to_string(), tokens })])
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedClient {
        async fn complete(
            &self,
            tier: ModelTier,
            _prompt: &str,
        ) -> Result<Completion, UpstreamError> {
            self.calls.lock().expect("calls poisoned").push(tier);
            self.script
                .lock()
                .expect("script poisoned")
                .pop_front()
                .unwrap_or(Err(UpstreamError::EmptyResponse))
        }
    }
}
