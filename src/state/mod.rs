//! # Business State
//!
//! Read-only view of the mutable loan-servicing records the fact engines
//! derive from. The CRUD surface that maintains these records lives
//! elsewhere; this crate only reads through [`LoanStateSource`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use futures_util::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State errors
#[derive(Debug, Clone, Error)]
pub enum StateError {
    #[error("Failed to load state seed: {0}")]
    Seed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for state reads
pub type StateResult<T> = Result<T, StateError>;

// ==================
// Records
// ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecklistStatus {
    Done,
    Open,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChecklistCategory {
    Documents,
    Servicing,
    Esg,
}

/// Trading-readiness checklist item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub title: String,
    pub category: ChecklistCategory,
    pub status: ChecklistStatus,
    pub weight: u32,
}

/// Loan document with its version numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub versions: Vec<u32>,
}

impl DocumentRecord {
    /// True once the document has been amended at least once
    pub fn is_amended(&self) -> bool {
        self.versions.iter().any(|v| *v >= 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOperator {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
}

impl ThresholdOperator {
    /// Whether `observed` satisfies the threshold
    pub fn holds(&self, observed: f64, threshold: f64) -> bool {
        match self {
            ThresholdOperator::Gte => observed >= threshold,
            ThresholdOperator::Gt => observed > threshold,
            ThresholdOperator::Lte => observed <= threshold,
            ThresholdOperator::Lt => observed < threshold,
        }
    }

    /// True for floor-style covenants (observed must stay above)
    pub fn is_floor(&self) -> bool {
        matches!(self, ThresholdOperator::Gte | ThresholdOperator::Gt)
    }
}

/// A measured metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub value: f64,
    pub as_of: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, f64>,
}

/// Financial or reporting covenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantRecord {
    pub id: String,
    pub name: String,
    pub covenant_type: String,
    pub metric: String,
    pub operator: ThresholdOperator,
    pub threshold: f64,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub observed: Option<Observation>,
    #[serde(default)]
    pub source_doc_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiDirection {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Pending,
    Unverified,
}

/// ESG key performance indicator attached to a sustainability-linked loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub direction: KpiDirection,
    pub target: f64,
    #[serde(default)]
    pub baseline: Option<f64>,
    #[serde(default)]
    pub observed: Option<Observation>,
    #[serde(default)]
    pub evidence_doc_ids: Vec<String>,
    pub verification: VerificationStatus,
    #[serde(default)]
    pub verifier: Option<String>,
}

/// Everything the engines read about one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub borrower: Option<String>,
    #[serde(default)]
    pub commitment: f64,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub covenants: Vec<CovenantRecord>,
    #[serde(default)]
    pub kpis: Vec<KpiRecord>,
    #[serde(default)]
    pub has_servicing_scenarios: bool,
    /// Audit events recorded against this loan by the CRUD surface
    #[serde(default)]
    pub audit_event_count: u64,
}

impl LoanRecord {
    /// An empty loan
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            borrower: None,
            commitment: 0.0,
            checklist: Vec::new(),
            documents: Vec::new(),
            covenants: Vec::new(),
            kpis: Vec::new(),
            has_servicing_scenarios: false,
            audit_event_count: 0,
        }
    }

    pub fn covenant(&self, covenant_id: &str) -> Option<&CovenantRecord> {
        self.covenants.iter().find(|c| c.id == covenant_id)
    }

    pub fn kpi(&self, kpi_id: &str) -> Option<&KpiRecord> {
        self.kpis.iter().find(|k| k.id == kpi_id)
    }
}

// ==================
// Source trait
// ==================

/// Read access to business state, scoped by tenant
pub trait LoanStateSource: Send + Sync {
    /// Fetch one loan
    fn loan<'a>(
        &'a self,
        tenant_id: &'a str,
        loan_id: &'a str,
    ) -> BoxFuture<'a, StateResult<Option<LoanRecord>>>;

    /// All loans of a tenant, ordered by id
    fn loans<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, StateResult<Vec<LoanRecord>>>;
}

/// Seed file layout: tenant id -> loans
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSeed {
    #[serde(default)]
    pub tenants: HashMap<String, Vec<LoanRecord>>,
}

/// In-memory state, loaded from a seed file or populated by tests
#[derive(Debug, Default)]
pub struct MemoryLoanState {
    tenants: RwLock<HashMap<String, HashMap<String, LoanRecord>>>,
}

impl MemoryLoanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON seed file
    pub fn from_seed_file(path: &Path) -> StateResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| StateError::Seed(format!("{}: {}", path.display(), e)))?;
        let seed: StateSeed = serde_json::from_str(&raw)
            .map_err(|e| StateError::Seed(format!("{}: {}", path.display(), e)))?;

        let state = Self::new();
        for (tenant_id, loans) in seed.tenants {
            for loan in loans {
                state.upsert_loan(&tenant_id, loan)?;
            }
        }
        Ok(state)
    }

    /// Insert or replace a loan
    pub fn upsert_loan(&self, tenant_id: &str, loan: LoanRecord) -> StateResult<()> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| StateError::Internal("Lock poisoned".into()))?;
        tenants
            .entry(tenant_id.to_string())
            .or_default()
            .insert(loan.id.clone(), loan);
        Ok(())
    }

    /// Apply an in-place edit to a loan; returns false if it does not exist
    pub fn update_loan<F>(&self, tenant_id: &str, loan_id: &str, edit: F) -> StateResult<bool>
    where
        F: FnOnce(&mut LoanRecord),
    {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| StateError::Internal("Lock poisoned".into()))?;
        match tenants.get_mut(tenant_id).and_then(|l| l.get_mut(loan_id)) {
            Some(loan) => {
                edit(loan);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tenant ids with at least one loan
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tenants
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl MemoryLoanState {
    fn read_loan(&self, tenant_id: &str, loan_id: &str) -> StateResult<Option<LoanRecord>> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StateError::Internal("Lock poisoned".into()))?;
        Ok(tenants
            .get(tenant_id)
            .and_then(|loans| loans.get(loan_id))
            .cloned())
    }

    fn read_loans(&self, tenant_id: &str) -> StateResult<Vec<LoanRecord>> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| StateError::Internal("Lock poisoned".into()))?;
        let mut loans: Vec<LoanRecord> = tenants
            .get(tenant_id)
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default();
        loans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(loans)
    }
}

impl LoanStateSource for MemoryLoanState {
    fn loan<'a>(
        &'a self,
        tenant_id: &'a str,
        loan_id: &'a str,
    ) -> BoxFuture<'a, StateResult<Option<LoanRecord>>> {
        future::ready(self.read_loan(tenant_id, loan_id)).boxed()
    }

    fn loans<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, StateResult<Vec<LoanRecord>>> {
        future::ready(self.read_loans(tenant_id)).boxed()
    }
}
