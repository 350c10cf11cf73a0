//! # Fact Errors

use thiserror::Error;

use crate::state::StateError;

/// Result type for fact operations
pub type FactResult<T> = Result<T, FactError>;

/// Fact computation and storage errors
#[derive(Debug, Clone, Error)]
pub enum FactError {
    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    #[error("Covenant not found: {covenant_id} on loan {loan_id}")]
    CovenantNotFound { loan_id: String, covenant_id: String },

    #[error("KPI not found: {kpi_id} on loan {loan_id}")]
    KpiNotFound { loan_id: String, kpi_id: String },

    #[error("Invalid entity reference: {0}")]
    InvalidEntity(String),

    #[error("State read failed: {0}")]
    State(#[from] StateError),

    #[error("Audit write failed: {0}")]
    Audit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FactError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            FactError::LoanNotFound(_) => 404,
            FactError::CovenantNotFound { .. } => 404,
            FactError::KpiNotFound { .. } => 404,
            FactError::InvalidEntity(_) => 400,
            FactError::State(_) => 500,
            FactError::Audit(_) => 500,
            FactError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for FactError {
    fn from(e: std::io::Error) -> Self {
        FactError::Audit(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FactError::LoanNotFound("L1".into()).status_code(), 404);
        assert_eq!(FactError::InvalidEntity("x".into()).status_code(), 400);
        assert_eq!(
            FactError::State(StateError::Internal("x".into())).status_code(),
            500
        );
    }
}
