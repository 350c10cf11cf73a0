//! # Trading Readiness Facts
//!
//! Weighted checklist score, band, contributing factors and blocking
//! issues for a single loan. Pure over a [`LoanRecord`].

use serde::{Deserialize, Serialize};

use crate::state::{ChecklistCategory, ChecklistStatus, LoanRecord};

/// OPEN items at or above this weight are reported as missing.
pub const MISSING_ITEM_WEIGHT: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessBand {
    Green,
    Amber,
    Red,
}

impl ReadinessBand {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            ReadinessBand::Green
        } else if score >= 55 {
            ReadinessBand::Amber
        } else {
            ReadinessBand::Red
        }
    }
}

/// How settled the document set is after amendments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmendmentStability {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributingFactors {
    pub documentation_completeness: f64,
    pub covenant_compliance: bool,
    pub amendment_stability: AmendmentStability,
    pub servicing_alerts: u32,
    pub esg_disclosure_coverage: f64,
    pub audit_trail_completeness: bool,
}

/// Readiness fact core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessCore {
    pub loan_id: String,
    pub readiness_score: u32,
    pub readiness_band: ReadinessBand,
    pub contributing_factors: ContributingFactors,
    pub blocking_issues: Vec<String>,
    pub fact_version: u32,
}

fn done_fraction(loan: &LoanRecord, category: ChecklistCategory) -> f64 {
    let items: Vec<_> = loan
        .checklist
        .iter()
        .filter(|i| i.category == category)
        .collect();
    if items.is_empty() {
        return 0.0;
    }
    let done = items
        .iter()
        .filter(|i| i.status == ChecklistStatus::Done)
        .count();
    done as f64 / items.len() as f64
}

fn amendment_stability(loan: &LoanRecord) -> AmendmentStability {
    if !loan.documents.iter().any(|d| d.is_amended()) {
        return AmendmentStability::None;
    }
    match loan.documents.len() {
        n if n < 3 => AmendmentStability::High,
        n if n < 6 => AmendmentStability::Medium,
        _ => AmendmentStability::Low,
    }
}

/// Derive the readiness core for a loan
pub fn derive(loan: &LoanRecord, fact_version: u32) -> ReadinessCore {
    // Summed wide: individual weights span the full u32 range
    let total_weight: u64 = loan.checklist.iter().map(|i| u64::from(i.weight)).sum();
    let total_weight = total_weight.max(1);
    let done_weight: u64 = loan
        .checklist
        .iter()
        .filter(|i| i.status == ChecklistStatus::Done)
        .map(|i| u64::from(i.weight))
        .sum();
    let readiness_score = ((done_weight as f64 / total_weight as f64) * 100.0).round() as u32;

    let servicing: Vec<_> = loan
        .checklist
        .iter()
        .filter(|i| i.category == ChecklistCategory::Servicing)
        .collect();

    let contributing_factors = ContributingFactors {
        documentation_completeness: done_fraction(loan, ChecklistCategory::Documents),
        covenant_compliance: servicing.iter().all(|i| i.status == ChecklistStatus::Done),
        amendment_stability: amendment_stability(loan),
        servicing_alerts: servicing
            .iter()
            .filter(|i| matches!(i.status, ChecklistStatus::Open | ChecklistStatus::Blocked))
            .count() as u32,
        esg_disclosure_coverage: done_fraction(loan, ChecklistCategory::Esg),
        audit_trail_completeness: loan.audit_event_count > 0,
    };

    let mut blocking_issues: Vec<String> = loan
        .checklist
        .iter()
        .filter(|i| i.status == ChecklistStatus::Blocked)
        .map(|i| format!("Blocked: {}", i.title))
        .collect();
    blocking_issues.extend(
        loan.checklist
            .iter()
            .filter(|i| i.status == ChecklistStatus::Open && i.weight >= MISSING_ITEM_WEIGHT)
            .map(|i| format!("Missing: {}", i.title)),
    );
    if loan.documents.is_empty() {
        blocking_issues.push("No documents uploaded".to_string());
    }
    if loan.covenants.is_empty() {
        blocking_issues.push("No covenants modeled".to_string());
    }
    if !loan.has_servicing_scenarios {
        blocking_issues.push("Servicing scenarios not configured".to_string());
    }

    ReadinessCore {
        loan_id: loan.id.clone(),
        readiness_score,
        readiness_band: ReadinessBand::from_score(readiness_score),
        contributing_factors,
        blocking_issues,
        fact_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ChecklistItem, CovenantRecord, DocumentRecord, ThresholdOperator};

    fn item(title: &str, category: ChecklistCategory, status: ChecklistStatus, weight: u32) -> ChecklistItem {
        ChecklistItem {
            id: title.to_lowercase(),
            title: title.to_string(),
            category,
            status,
            weight,
        }
    }

    fn doc(id: &str, versions: Vec<u32>) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: id.to_string(),
            versions,
        }
    }

    fn covenant() -> CovenantRecord {
        CovenantRecord {
            id: "C1".into(),
            name: "DSCR".into(),
            covenant_type: "Financial".into(),
            metric: "DSCR".into(),
            operator: ThresholdOperator::Gte,
            threshold: 1.25,
            formula: None,
            observed: None,
            source_doc_ids: vec![],
        }
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(ReadinessBand::from_score(80), ReadinessBand::Green);
        assert_eq!(ReadinessBand::from_score(79), ReadinessBand::Amber);
        assert_eq!(ReadinessBand::from_score(55), ReadinessBand::Amber);
        assert_eq!(ReadinessBand::from_score(54), ReadinessBand::Red);
    }

    #[test]
    fn test_empty_loan_surfaces_gaps() {
        let core = derive(&LoanRecord::new("L1", "Alpha"), 1);

        assert_eq!(core.readiness_score, 0);
        assert_eq!(core.readiness_band, ReadinessBand::Red);
        assert_eq!(
            core.blocking_issues,
            vec![
                "No documents uploaded",
                "No covenants modeled",
                "Servicing scenarios not configured"
            ]
        );
        // No servicing items: vacuously compliant
        assert!(core.contributing_factors.covenant_compliance);
        assert_eq!(core.contributing_factors.amendment_stability, AmendmentStability::None);
    }

    #[test]
    fn test_weighted_score_and_issues() {
        let mut loan = LoanRecord::new("L1", "Alpha");
        loan.checklist = vec![
            item("Facility agreement", ChecklistCategory::Documents, ChecklistStatus::Done, 40),
            item("KYC pack", ChecklistCategory::Documents, ChecklistStatus::Open, 20),
            item("Agent consent", ChecklistCategory::Servicing, ChecklistStatus::Blocked, 10),
            item("Impact report", ChecklistCategory::Esg, ChecklistStatus::Done, 30),
        ];
        loan.documents = vec![doc("D1", vec![1, 2])];
        loan.covenants = vec![covenant()];
        loan.has_servicing_scenarios = true;
        loan.audit_event_count = 3;

        let core = derive(&loan, 1);
        assert_eq!(core.readiness_score, 70);
        assert_eq!(core.readiness_band, ReadinessBand::Amber);
        assert_eq!(
            core.blocking_issues,
            vec!["Blocked: Agent consent", "Missing: KYC pack"]
        );

        let factors = &core.contributing_factors;
        assert_eq!(factors.documentation_completeness, 0.5);
        assert!(!factors.covenant_compliance);
        assert_eq!(factors.servicing_alerts, 1);
        assert_eq!(factors.esg_disclosure_coverage, 1.0);
        assert_eq!(factors.amendment_stability, AmendmentStability::High);
        assert!(factors.audit_trail_completeness);
    }

    #[test]
    fn test_amendment_stability_by_document_count() {
        let mut loan = LoanRecord::new("L1", "Alpha");
        loan.documents = (0..4).map(|i| doc(&format!("D{}", i), vec![1])).collect();
        assert_eq!(amendment_stability(&loan), AmendmentStability::None);

        loan.documents[0].versions.push(2);
        assert_eq!(amendment_stability(&loan), AmendmentStability::Medium);

        loan.documents.extend((4..6).map(|i| doc(&format!("D{}", i), vec![1])));
        assert_eq!(amendment_stability(&loan), AmendmentStability::Low);
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let mut loan = LoanRecord::new("L1", "Alpha");
        loan.checklist = vec![
            item("Facility agreement", ChecklistCategory::Documents, ChecklistStatus::Done, 3_000_000_000),
            item("KYC pack", ChecklistCategory::Documents, ChecklistStatus::Done, 3_000_000_000),
        ];
        let core = derive(&loan, 1);
        assert_eq!(core.readiness_score, 100);
        assert_eq!(core.readiness_band, ReadinessBand::Green);

        loan.checklist[1].status = ChecklistStatus::Open;
        assert_eq!(derive(&loan, 1).readiness_score, 50);
    }

    #[test]
    fn test_small_open_item_not_missing() {
        let mut loan = LoanRecord::new("L1", "Alpha");
        loan.checklist = vec![item("Minor", ChecklistCategory::Documents, ChecklistStatus::Open, 14)];
        let core = derive(&loan, 1);
        assert!(!core.blocking_issues.iter().any(|i| i.starts_with("Missing")));
    }
}
