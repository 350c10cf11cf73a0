//! # Covenant Facts
//!
//! Threshold versus observed metric for a single covenant. No legal
//! interpretation: status comes only from the modeled rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::round_to;
use crate::state::{CovenantRecord, ThresholdOperator};

/// Compliant values closer than this fraction of the threshold are AT_RISK.
pub const AT_RISK_HEADROOM: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CovenantStatus {
    Compliant,
    AtRisk,
    Breach,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub metric: String,
    pub operator: ThresholdOperator,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observed {
    pub metric: String,
    pub value: f64,
    pub as_of: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreachDetail {
    /// observed - threshold
    pub delta: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSignals {
    pub formula: Option<String>,
    pub inputs: BTreeMap<String, f64>,
    pub as_of: Option<String>,
}

/// Covenant fact core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantCore {
    pub loan_id: String,
    pub covenant_id: String,
    pub covenant_name: String,
    pub covenant_type: String,
    pub status: CovenantStatus,
    pub threshold: Threshold,
    pub observed: Option<Observed>,
    pub breach_detail: Option<BreachDetail>,
    pub input_signals: InputSignals,
    pub source_doc_ids: Vec<String>,
    pub fact_version: u32,
}

fn severity(delta: f64, threshold: f64) -> Severity {
    let ratio = delta.abs() / threshold.abs().max(f64::EPSILON);
    if ratio >= 0.2 {
        Severity::High
    } else if ratio >= 0.05 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Status and breach detail for an observed value
pub fn evaluate(covenant: &CovenantRecord) -> (CovenantStatus, Option<BreachDetail>) {
    let observed = match &covenant.observed {
        Some(o) => o.value,
        None => return (CovenantStatus::Unknown, None),
    };

    let delta = round_to(observed - covenant.threshold, 4);
    if !covenant.operator.holds(observed, covenant.threshold) {
        return (
            CovenantStatus::Breach,
            Some(BreachDetail {
                delta,
                severity: severity(delta, covenant.threshold),
            }),
        );
    }

    let headroom = if covenant.operator.is_floor() { delta } else { -delta };
    if headroom < covenant.threshold.abs() * AT_RISK_HEADROOM {
        return (
            CovenantStatus::AtRisk,
            Some(BreachDetail {
                delta,
                severity: Severity::Low,
            }),
        );
    }

    (CovenantStatus::Compliant, None)
}

/// Derive the covenant core
pub fn derive(loan_id: &str, covenant: &CovenantRecord, fact_version: u32) -> CovenantCore {
    let (status, breach_detail) = evaluate(covenant);

    let mut source_doc_ids = covenant.source_doc_ids.clone();
    source_doc_ids.sort();

    CovenantCore {
        loan_id: loan_id.to_string(),
        covenant_id: covenant.id.clone(),
        covenant_name: covenant.name.clone(),
        covenant_type: covenant.covenant_type.clone(),
        status,
        threshold: Threshold {
            metric: covenant.metric.clone(),
            operator: covenant.operator,
            value: covenant.threshold,
        },
        observed: covenant.observed.as_ref().map(|o| Observed {
            metric: covenant.metric.clone(),
            value: o.value,
            as_of: o.as_of.clone(),
        }),
        breach_detail,
        input_signals: InputSignals {
            formula: covenant.formula.clone(),
            inputs: covenant
                .observed
                .as_ref()
                .map(|o| o.inputs.clone())
                .unwrap_or_default(),
            as_of: covenant.observed.as_ref().map(|o| o.as_of.clone()),
        },
        source_doc_ids,
        fact_version,
    }
}
