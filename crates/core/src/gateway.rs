//! Completion Gateway contract.
//!
//! Every language-model call in the workspace goes through [`CompletionGateway`]:
//! free-form prompt in, free-form text out. Implementations live in
//! `briefly-agent` and are injected into handlers at bootstrap.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion prompt is empty")]
    EmptyPrompt,
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion service rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("completion service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("completion response could not be decoded: {0}")]
    MalformedResponse(String),
    #[error("agent tool failed: {0}")]
    Tool(String),
}

impl CompletionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "empty_prompt",
            Self::Transport(_) => "transport",
            Self::RateLimited { .. } => "rate_limited",
            Self::Api { .. } => "api",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Tool(_) => "tool",
        }
    }
}

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Short label used in startup logs and the health payload.
    fn describe(&self) -> &'static str {
        "completion"
    }
}

/// Rejects blank prompts before any outbound call is made.
pub fn ensure_prompt(prompt: &str) -> Result<&str, CompletionError> {
    if prompt.trim().is_empty() {
        return Err(CompletionError::EmptyPrompt);
    }
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::{ensure_prompt, CompletionError};

    #[test]
    fn blank_prompts_are_rejected() {
        assert_eq!(ensure_prompt("   \n"), Err(CompletionError::EmptyPrompt));
        assert_eq!(ensure_prompt("summarize this"), Ok("summarize this"));
    }

    #[test]
    fn error_kinds_are_stable_log_labels() {
        assert_eq!(CompletionError::RateLimited { retry_after_secs: Some(3) }.kind(), "rate_limited");
        assert_eq!(
            CompletionError::Api { status: 500, message: "boom".to_owned() }.kind(),
            "api"
        );
        assert_eq!(CompletionError::Transport("reset".to_owned()).kind(), "transport");
    }
}
