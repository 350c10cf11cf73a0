//! Fact snapshot types
//!
//! A snapshot is the persisted, immutable form of a fact core. Its
//! `fact_hash` is the canonical hash of `facts`; snapshots are appended per
//! entity and never rewritten.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::errors::{FactError, FactResult};
use crate::gateway::Module;

/// Identity written into `computed_by`.
pub const COMPUTED_BY_SYSTEM: &str = "SYSTEM";

/// Fact domain, one per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactDomain {
    Readiness,
    Covenant,
    EsgKpi,
    Portfolio,
}

impl FactDomain {
    pub const ALL: [FactDomain; 4] = [
        FactDomain::Readiness,
        FactDomain::Covenant,
        FactDomain::EsgKpi,
        FactDomain::Portfolio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactDomain::Readiness => "READINESS",
            FactDomain::Covenant => "COVENANT",
            FactDomain::EsgKpi => "ESG_KPI",
            FactDomain::Portfolio => "PORTFOLIO",
        }
    }

    /// Gateway module explanations for this domain are billed to
    pub fn module(&self) -> Module {
        match self {
            FactDomain::Readiness => Module::Trading,
            FactDomain::Covenant => Module::Servicing,
            FactDomain::EsgKpi => Module::Esg,
            FactDomain::Portfolio => Module::Portfolio,
        }
    }

    /// Service identity used on audit events for this engine
    pub fn client_id(&self) -> &'static str {
        match self {
            FactDomain::Readiness => "trading-readiness-facts-service",
            FactDomain::Covenant => "covenant-facts-service",
            FactDomain::EsgKpi => "esg-kpi-facts-service",
            FactDomain::Portfolio => "portfolio-facts-service",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FactDomain::Readiness => "Trading readiness",
            FactDomain::Covenant => "Covenant evaluation",
            FactDomain::EsgKpi => "ESG KPI evaluation",
            FactDomain::Portfolio => "Portfolio risk",
        }
    }

    /// Summary line for the computed audit event
    pub fn computed_summary(&self) -> String {
        format!("{} fact snapshot computed", self.label())
    }
}

impl fmt::Display for FactDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The entity a snapshot describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityRef {
    /// Trading readiness of a loan
    #[serde(rename_all = "camelCase")]
    Loan { loan_id: String },

    #[serde(rename_all = "camelCase")]
    Covenant { loan_id: String, covenant_id: String },

    #[serde(rename_all = "camelCase")]
    Kpi { loan_id: String, kpi_id: String },

    #[serde(rename_all = "camelCase")]
    Portfolio { portfolio_id: String },
}

impl EntityRef {
    pub fn loan(loan_id: impl Into<String>) -> Self {
        EntityRef::Loan {
            loan_id: loan_id.into(),
        }
    }

    pub fn covenant(loan_id: impl Into<String>, covenant_id: impl Into<String>) -> Self {
        EntityRef::Covenant {
            loan_id: loan_id.into(),
            covenant_id: covenant_id.into(),
        }
    }

    pub fn kpi(loan_id: impl Into<String>, kpi_id: impl Into<String>) -> Self {
        EntityRef::Kpi {
            loan_id: loan_id.into(),
            kpi_id: kpi_id.into(),
        }
    }

    pub fn portfolio(portfolio_id: impl Into<String>) -> Self {
        EntityRef::Portfolio {
            portfolio_id: portfolio_id.into(),
        }
    }

    pub fn domain(&self) -> FactDomain {
        match self {
            EntityRef::Loan { .. } => FactDomain::Readiness,
            EntityRef::Covenant { .. } => FactDomain::Covenant,
            EntityRef::Kpi { .. } => FactDomain::EsgKpi,
            EntityRef::Portfolio { .. } => FactDomain::Portfolio,
        }
    }

    pub fn loan_id(&self) -> Option<&str> {
        match self {
            EntityRef::Loan { loan_id }
            | EntityRef::Covenant { loan_id, .. }
            | EntityRef::Kpi { loan_id, .. } => Some(loan_id),
            EntityRef::Portfolio { .. } => None,
        }
    }

    /// "LOAN" or "PORTFOLIO", as recorded on AI calls
    pub fn entity_type(&self) -> &'static str {
        match self {
            EntityRef::Portfolio { .. } => "PORTFOLIO",
            _ => "LOAN",
        }
    }

    /// Id recorded as audit evidence
    pub fn evidence_ref(&self) -> &str {
        match self {
            EntityRef::Loan { loan_id }
            | EntityRef::Covenant { loan_id, .. }
            | EntityRef::Kpi { loan_id, .. } => loan_id,
            EntityRef::Portfolio { portfolio_id } => portfolio_id,
        }
    }

    /// Identifying fields, flattened, for hash inputs and payloads
    pub fn id_fields(&self) -> Value {
        match self {
            EntityRef::Loan { loan_id } => json!({ "loanId": loan_id }),
            EntityRef::Covenant {
                loan_id,
                covenant_id,
            } => json!({ "loanId": loan_id, "covenantId": covenant_id }),
            EntityRef::Kpi { loan_id, kpi_id } => json!({ "loanId": loan_id, "kpiId": kpi_id }),
            EntityRef::Portfolio { portfolio_id } => json!({ "portfolioId": portfolio_id }),
        }
    }

    /// Reject empty identifiers
    pub fn validate(&self) -> FactResult<()> {
        let ids: Vec<&str> = match self {
            EntityRef::Loan { loan_id } => vec![loan_id],
            EntityRef::Covenant {
                loan_id,
                covenant_id,
            } => vec![loan_id, covenant_id],
            EntityRef::Kpi { loan_id, kpi_id } => vec![loan_id, kpi_id],
            EntityRef::Portfolio { portfolio_id } => vec![portfolio_id],
        };
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(FactError::InvalidEntity(format!("empty identifier in {}", self)));
        }
        Ok(())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Loan { loan_id } => write!(f, "loan:{}", loan_id),
            EntityRef::Covenant {
                loan_id,
                covenant_id,
            } => write!(f, "loan:{}/covenant:{}", loan_id, covenant_id),
            EntityRef::Kpi { loan_id, kpi_id } => write!(f, "loan:{}/kpi:{}", loan_id, kpi_id),
            EntityRef::Portfolio { portfolio_id } => write!(f, "portfolio:{}", portfolio_id),
        }
    }
}

/// Persisted fact snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactSnapshot {
    pub id: Uuid,
    pub tenant_id: String,
    pub domain: FactDomain,
    pub entity: EntityRef,
    pub fact_hash: String,
    pub fact_version: u32,
    /// The fact core the hash was computed over
    pub facts: Value,
    pub computed_at: DateTime<Utc>,
    pub computed_by: String,
    pub correlation_id: Option<String>,
}

/// Result of one compute-and-persist run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeOutcome {
    /// The persisted row for this hash (pre-existing on dedup)
    pub snapshot: FactSnapshot,

    /// New hash differs from the entity's previous latest hash
    pub drifted: bool,

    pub prev_fact_hash: Option<String>,

    pub prev_computed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_serde_shape() {
        let entity = EntityRef::covenant("L1", "C9");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json, json!({"kind": "COVENANT", "loanId": "L1", "covenantId": "C9"}));

        let back: EntityRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_entity_domain_and_module() {
        assert_eq!(EntityRef::loan("L1").domain(), FactDomain::Readiness);
        assert_eq!(EntityRef::kpi("L1", "K1").domain().module(), Module::Esg);
        assert_eq!(EntityRef::portfolio("p").entity_type(), "PORTFOLIO");
        assert_eq!(EntityRef::portfolio("p").loan_id(), None);
        assert_eq!(EntityRef::covenant("L1", "C1").evidence_ref(), "L1");
    }

    #[test]
    fn test_entity_validation() {
        assert!(EntityRef::loan("L1").validate().is_ok());
        assert!(EntityRef::kpi("L1", " ").validate().is_err());
        assert!(EntityRef::portfolio("").validate().is_err());
    }

    #[test]
    fn test_id_fields() {
        assert_eq!(
            EntityRef::kpi("L1", "K1").id_fields(),
            json!({"loanId": "L1", "kpiId": "K1"})
        );
    }
}
