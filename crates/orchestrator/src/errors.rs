use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// The bare message without the variant prefix, as surfaced to the model
    pub fn message(&self) -> &str {
        match self {
            AgentError::ToolNotFound(msg)
            | AgentError::InvalidParameters(msg)
            | AgentError::ExecutionError(msg)
            | AgentError::MissingCredential(msg)
            | AgentError::Timeout(msg)
            | AgentError::Internal(msg) => msg,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
