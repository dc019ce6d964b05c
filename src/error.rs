//! Error types for the classification pipeline
//!
//! Every variant is terminal for the invocation it occurs in. The client folds
//! them into `ClassificationOutcome::Failure` together with the failing stage.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest slice of a response body quoted in an error message
const MAX_BODY_SNIPPET: usize = 256;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    EmptyInput(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Unexpected response shape: {0}")]
    Protocol(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Fieldless discriminant of `PipelineError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    Transport,
    Timeout,
    Status,
    Decode,
    Protocol,
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyInput(_) => ErrorKind::EmptyInput,
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Status { .. } => ErrorKind::Status,
            PipelineError::Decode(_) => ErrorKind::Decode,
            PipelineError::Protocol(_) => ErrorKind::Protocol,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn status(status: u16, body: &[u8]) -> Self {
        PipelineError::Status {
            status,
            body: body_snippet(body),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        PipelineError::Protocol(message.into())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while constructing a client, before any invocation
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // Only the connect timeout lives in reqwest; stage budgets are enforced by the client
            PipelineError::Transport(format!("timed out: {}", err))
        } else if err.is_decode() {
            PipelineError::Decode(err.to_string())
        } else {
            PipelineError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "<empty body>".to_string();
    }
    match text.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
