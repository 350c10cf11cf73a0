//! # Impact Errors

use thiserror::Error;

use crate::jobs::JobError;

/// Result type for impact operations
pub type ImpactResult<T> = Result<T, ImpactError>;

#[derive(Debug, Clone, Error)]
pub enum ImpactError {
    #[error("Invalid source change: {0}")]
    Validation(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Audit write failed: {0}")]
    Audit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImpactError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ImpactError::Validation(_) => 400,
            ImpactError::Job(e) => e.status_code(),
            ImpactError::Audit(_) => 500,
            ImpactError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for ImpactError {
    fn from(e: std::io::Error) -> Self {
        ImpactError::Audit(e.to_string())
    }
}
