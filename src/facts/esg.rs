//! # ESG KPI Facts
//!
//! Target attainment, progress score, evidence and verification state for
//! one sustainability KPI.

use serde::{Deserialize, Serialize};

use crate::state::{KpiDirection, KpiRecord, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiStatus {
    OnTrack,
    OffTrack,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub unit: String,
    pub direction: KpiDirection,
    pub target: f64,
    pub baseline: Option<f64>,
    pub observed: Option<f64>,
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub doc_ids: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub status: VerificationStatus,
    pub verifier: Option<String>,
}

/// ESG KPI fact core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiCore {
    pub loan_id: String,
    pub kpi_id: String,
    pub kpi_code: String,
    pub kpi_name: String,
    pub status: KpiStatus,
    /// Progress from baseline to target, 0..=100
    pub score: Option<u32>,
    pub reason_codes: Vec<String>,
    pub measurement: Measurement,
    pub evidence: Evidence,
    pub verification: Verification,
    pub fact_version: u32,
}

fn target_met(kpi: &KpiRecord, observed: f64) -> bool {
    match kpi.direction {
        KpiDirection::HigherIsBetter => observed >= kpi.target,
        KpiDirection::LowerIsBetter => observed <= kpi.target,
    }
}

fn progress_score(kpi: &KpiRecord, observed: f64) -> u32 {
    match kpi.baseline {
        Some(baseline) if (kpi.target - baseline).abs() > f64::EPSILON => {
            let progress = (observed - baseline) / (kpi.target - baseline);
            (progress.clamp(0.0, 1.0) * 100.0).round() as u32
        }
        _ => {
            if target_met(kpi, observed) {
                100
            } else {
                0
            }
        }
    }
}

/// Status and progress score
pub fn evaluate(kpi: &KpiRecord) -> (KpiStatus, Option<u32>) {
    match &kpi.observed {
        None => (KpiStatus::NoData, None),
        Some(o) if target_met(kpi, o.value) => (KpiStatus::OnTrack, Some(progress_score(kpi, o.value))),
        Some(o) => (KpiStatus::OffTrack, Some(progress_score(kpi, o.value))),
    }
}

/// Derive the KPI core
pub fn derive(loan_id: &str, kpi: &KpiRecord, fact_version: u32) -> KpiCore {
    let (status, score) = evaluate(kpi);

    let mut reason_codes = Vec::new();
    match status {
        KpiStatus::NoData => reason_codes.push("NO_MEASUREMENT"),
        KpiStatus::OnTrack => reason_codes.push("TARGET_MET"),
        KpiStatus::OffTrack => reason_codes.push("TARGET_NOT_MET"),
    }
    if kpi.evidence_doc_ids.is_empty() {
        reason_codes.push("NO_EVIDENCE");
    }
    match kpi.verification {
        VerificationStatus::Verified => {}
        VerificationStatus::Pending => reason_codes.push("VERIFICATION_PENDING"),
        VerificationStatus::Unverified => reason_codes.push("NOT_VERIFIED"),
    }

    let mut doc_ids = kpi.evidence_doc_ids.clone();
    doc_ids.sort();
    doc_ids.dedup();

    KpiCore {
        loan_id: loan_id.to_string(),
        kpi_id: kpi.id.clone(),
        kpi_code: kpi.code.clone(),
        kpi_name: kpi.name.clone(),
        status,
        score,
        reason_codes: reason_codes.into_iter().map(String::from).collect(),
        measurement: Measurement {
            unit: kpi.unit.clone(),
            direction: kpi.direction,
            target: kpi.target,
            baseline: kpi.baseline,
            observed: kpi.observed.as_ref().map(|o| o.value),
            as_of: kpi.observed.as_ref().map(|o| o.as_of.clone()),
        },
        evidence: Evidence {
            count: doc_ids.len(),
            doc_ids,
        },
        verification: Verification {
            status: kpi.verification,
            verifier: kpi.verifier.clone(),
        },
        fact_version,
    }
}
