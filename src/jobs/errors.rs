//! # Job Errors

use thiserror::Error;

use crate::context::ContextError;
use crate::explain::ExplainError;
use crate::facts::FactError;

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Fact(#[from] FactError),

    #[error(transparent)]
    Explain(#[from] ExplainError),

    #[error("Audit write failed: {0}")]
    Audit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            JobError::InvalidJob(_) => 400,
            JobError::InvalidCron(_) => 400,
            JobError::NotFound(_) => 404,
            JobError::Context(ContextError::Invalid(_)) => 400,
            JobError::Context(ContextError::Missing(_)) => 500,
            JobError::Fact(e) => e.status_code(),
            JobError::Explain(e) => e.status_code(),
            JobError::Audit(_) => 500,
            JobError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::Audit(e.to_string())
    }
}
