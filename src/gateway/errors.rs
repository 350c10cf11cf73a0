//! # Gateway Errors
//!
//! Backend failures carry an explicit `retryable` flag; the fallback
//! decision reads that flag and nothing else.

use std::fmt;

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure reported by a generation backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    /// Transient failures get one fallback attempt
    pub retryable: bool,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }

    /// Error type recorded on failure events
    pub fn kind(&self) -> &'static str {
        if self.retryable {
            "TRANSIENT"
        } else {
            "PERMANENT"
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} generation error: {}", self.kind().to_lowercase(), self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Gateway errors
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    // ==================
    // Caller errors
    // ==================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Prompt template not found: {id}@v{version}")]
    TemplateNotFound { id: String, version: u32 },

    #[error("Rate limit exceeded for {key}: retry after {retry_after_seconds}s")]
    RateLimitExceeded {
        key: String,
        retry_after_seconds: u64,
        count: u64,
        limit: u64,
    },

    // ==================
    // Generation errors
    // ==================
    #[error("Backend {backend} failed: {source}")]
    Generation {
        backend: String,
        #[source]
        source: GenerationError,
    },

    #[error("Output failed schema validation: {0}")]
    OutputSchemaValidation(String),

    // ==================
    // Infrastructure
    // ==================
    #[error("Audit write failed: {0}")]
    Audit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// True only for backend errors flagged retryable
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Generation { source, .. } if source.retryable)
    }

    /// Short type name recorded on failure events
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION",
            GatewayError::TemplateNotFound { .. } => "TEMPLATE_NOT_FOUND",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::Generation { source, .. } => {
                if source.retryable {
                    "TRANSIENT_GENERATION"
                } else {
                    "PERMANENT_GENERATION"
                }
            }
            GatewayError::OutputSchemaValidation(_) => "OUTPUT_SCHEMA_VALIDATION",
            GatewayError::Audit(_) => "AUDIT",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::TemplateNotFound { .. } => 400,
            GatewayError::RateLimitExceeded { .. } => 429,
            GatewayError::Generation { source, .. } => {
                if source.retryable {
                    503
                } else {
                    502
                }
            }
            GatewayError::OutputSchemaValidation(_) => 502,
            GatewayError::Audit(_) => 500,
            GatewayError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Audit(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(retryable: bool) -> GatewayError {
        GatewayError::Generation {
            backend: "DEMO_PRIMARY".into(),
            source: GenerationError {
                retryable,
                message: "boom".into(),
            },
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(generation(true).is_transient());
        assert!(!generation(false).is_transient());
        assert!(!GatewayError::OutputSchemaValidation("x".into()).is_transient());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(generation(true).status_code(), 503);
        assert_eq!(
            GatewayError::RateLimitExceeded {
                key: "k".into(),
                retry_after_seconds: 5,
                count: 4,
                limit: 3
            }
            .status_code(),
            429
        );
    }

    #[test]
    fn test_display() {
        let msg = generation(false).to_string();
        assert!(msg.contains("DEMO_PRIMARY"));
        assert!(msg.contains("permanent"));
    }
}
