//! # Explain Errors

use thiserror::Error;

use crate::facts::FactError;
use crate::gateway::GatewayError;

/// Result type for explanation operations
pub type ExplainResult<T> = Result<T, ExplainError>;

#[derive(Debug, Clone, Error)]
pub enum ExplainError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// No fact snapshot to explain; facts must be recomputed first
    #[error("No fact snapshot for {entity}{}", at_hash(.fact_hash))]
    PrerequisiteMissing {
        entity: String,
        fact_hash: Option<String>,
    },

    #[error(transparent)]
    Fact(#[from] FactError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Audit write failed: {0}")]
    Audit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn at_hash(fact_hash: &Option<String>) -> String {
    fact_hash.as_deref().map(|h| format!(" at {}", h)).unwrap_or_default()
}

impl ExplainError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ExplainError::Validation(_) => 400,
            ExplainError::PrerequisiteMissing { .. } => 409,
            ExplainError::Fact(e) => e.status_code(),
            ExplainError::Gateway(e) => e.status_code(),
            ExplainError::Audit(_) => 500,
            ExplainError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for ExplainError {
    fn from(e: std::io::Error) -> Self {
        ExplainError::Audit(e.to_string())
    }
}
