use thiserror::Error;

/// Failure taxonomy for tool invocations.
///
/// Validation and NotFound are returned directly as tool-level failures.
/// Storage and Upstream are likewise surfaced to the caller: a single attempt,
/// no automatic retry, no circuit breaking. Notification failures never reach
/// this type; they are logged and swallowed at the notify layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("lead not found: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("upstream generation failure: {0}")]
    Upstream(String),
}

impl ToolError {
    /// Stable machine-readable class for structured responses and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Upstream(_) => "upstream",
        }
    }

    /// User-safe message that never leaks internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "The request could not be processed. Check inputs and try again.",
            Self::NotFound(_) => "No lead with that email exists in the pipeline.",
            Self::Storage(_) => "The lead store is temporarily unavailable. Please retry shortly.",
            Self::Upstream(_) => "The generation service is unavailable. Please retry shortly.",
        }
    }
}
