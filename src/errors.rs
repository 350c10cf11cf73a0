//! # Crate Errors
//!
//! One taxonomy for the outer surfaces (HTTP, CLI). Module errors fold
//! into it; `code()` is the stable string clients match on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::context::ContextError;
use crate::explain::ExplainError;
use crate::facts::FactError;
use crate::gateway::GatewayError;
use crate::impact::ImpactError;
use crate::jobs::JobError;
use crate::state::StateError;

pub type FactlineResult<T> = Result<T, FactlineError>;

#[derive(Debug, Clone, Error)]
pub enum FactlineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("Rate limit exceeded for {key}: retry after {retry_after_seconds}s")]
    RateLimitExceeded { key: String, retry_after_seconds: u64 },

    /// Backend failure; transient iff `retryable`. Timeouts land here as transient.
    #[error("Generation failed: {message}")]
    Generation { retryable: bool, message: String },

    #[error("Output failed schema validation: {0}")]
    OutputSchemaValidation(String),

    #[error("Missing context: {0}")]
    MissingContext(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FactlineError {
    pub fn code(&self) -> &'static str {
        match self {
            FactlineError::Validation(_) => "VALIDATION_ERROR",
            FactlineError::PrerequisiteMissing(_) => "PREREQUISITE_MISSING",
            FactlineError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            FactlineError::Generation { retryable: true, .. } => "TRANSIENT_GENERATION_ERROR",
            FactlineError::Generation { retryable: false, .. } => "PERMANENT_GENERATION_ERROR",
            FactlineError::OutputSchemaValidation(_) => "OUTPUT_SCHEMA_VALIDATION",
            FactlineError::MissingContext(_) => "MISSING_CONTEXT",
            FactlineError::NotFound(_) => "NOT_FOUND",
            FactlineError::Config(_) => "CONFIG_ERROR",
            FactlineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            FactlineError::Validation(_) => 400,
            FactlineError::PrerequisiteMissing(_) => 409,
            FactlineError::RateLimitExceeded { .. } => 429,
            FactlineError::Generation { retryable: true, .. } => 503,
            FactlineError::Generation { retryable: false, .. } => 502,
            FactlineError::OutputSchemaValidation(_) => 502,
            FactlineError::MissingContext(_) => 400,
            FactlineError::NotFound(_) => 404,
            FactlineError::Config(_) => 500,
            FactlineError::Internal(_) => 500,
        }
    }

    /// Seconds a caller should wait before retrying, when known
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            FactlineError::RateLimitExceeded { retry_after_seconds, .. } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl From<ContextError> for FactlineError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Missing(m) => FactlineError::MissingContext(m),
            ContextError::Invalid(m) => FactlineError::Validation(m),
        }
    }
}

impl From<StateError> for FactlineError {
    fn from(e: StateError) -> Self {
        FactlineError::Internal(e.to_string())
    }
}

impl From<ConfigError> for FactlineError {
    fn from(e: ConfigError) -> Self {
        FactlineError::Config(e.to_string())
    }
}

impl From<FactError> for FactlineError {
    fn from(e: FactError) -> Self {
        match e {
            FactError::LoanNotFound(_) | FactError::CovenantNotFound { .. } | FactError::KpiNotFound { .. } => {
                FactlineError::NotFound(e.to_string())
            }
            FactError::InvalidEntity(m) => FactlineError::Validation(m),
            FactError::State(e) => e.into(),
            FactError::Audit(_) | FactError::Internal(_) => FactlineError::Internal(e.to_string()),
        }
    }
}

impl From<GatewayError> for FactlineError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Validation(m) => FactlineError::Validation(m),
            GatewayError::TemplateNotFound { .. } => FactlineError::Validation(e.to_string()),
            GatewayError::RateLimitExceeded {
                key,
                retry_after_seconds,
                ..
            } => FactlineError::RateLimitExceeded {
                key,
                retry_after_seconds,
            },
            GatewayError::Generation { backend, source } => FactlineError::Generation {
                retryable: source.retryable,
                message: format!("{}: {}", backend, source.message),
            },
            GatewayError::OutputSchemaValidation(m) => FactlineError::OutputSchemaValidation(m),
            GatewayError::Audit(_) | GatewayError::Internal(_) => FactlineError::Internal(e.to_string()),
        }
    }
}

impl From<ExplainError> for FactlineError {
    fn from(e: ExplainError) -> Self {
        match e {
            ExplainError::Validation(m) => FactlineError::Validation(m),
            ExplainError::PrerequisiteMissing { .. } => FactlineError::PrerequisiteMissing(e.to_string()),
            ExplainError::Fact(e) => e.into(),
            ExplainError::Gateway(e) => e.into(),
            ExplainError::Audit(_) | ExplainError::Internal(_) => FactlineError::Internal(e.to_string()),
        }
    }
}

impl From<JobError> for FactlineError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::InvalidJob(m) | JobError::InvalidCron(m) => FactlineError::Validation(m),
            JobError::NotFound(m) => FactlineError::NotFound(m),
            JobError::Context(e) => e.into(),
            JobError::Fact(e) => e.into(),
            JobError::Explain(e) => e.into(),
            JobError::Audit(_) | JobError::Internal(_) => FactlineError::Internal(e.to_string()),
        }
    }
}

impl From<ImpactError> for FactlineError {
    fn from(e: ImpactError) -> Self {
        match e {
            ImpactError::Validation(m) => FactlineError::Validation(m),
            ImpactError::Job(e) => e.into(),
            ImpactError::Audit(_) | ImpactError::Internal(_) => FactlineError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for FactlineError {
    fn from(e: std::io::Error) -> Self {
        FactlineError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GenerationError;

    #[test]
    fn test_gateway_errors_fold() {
        let err: FactlineError = GatewayError::RateLimitExceeded {
            key: "ai:rl:t1:SERVICE:TRADING:X".into(),
            retry_after_seconds: 42,
            count: 4,
            limit: 3,
        }
        .into();
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.retry_after(), Some(42));

        let err: FactlineError = GatewayError::Generation {
            backend: "DEMO_PRIMARY".into(),
            source: GenerationError::transient("timed out after 10ms"),
        }
        .into();
        assert!(matches!(err, FactlineError::Generation { retryable: true, .. }));
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_nested_errors_fold() {
        let err: FactlineError = JobError::Explain(ExplainError::PrerequisiteMissing {
            entity: "loan:L1".into(),
            fact_hash: None,
        })
        .into();
        assert_eq!(err.code(), "PREREQUISITE_MISSING");
        assert_eq!(err.status_code(), 409);

        let err: FactlineError = ImpactError::Job(JobError::Fact(FactError::LoanNotFound("L9".into()))).into();
        assert_eq!(err.status_code(), 404);

        let err: FactlineError = ContextError::Missing("no tenant".into()).into();
        assert_eq!(err.code(), "MISSING_CONTEXT");
    }
}
