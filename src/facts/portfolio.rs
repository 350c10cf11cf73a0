//! # Portfolio Facts
//!
//! Tenant-wide rollup over every loan: readiness band distribution,
//! covenant and KPI status counts, exposure and the most frequent
//! blocking issues. Built from the same per-loan derivations the other
//! engines use, so a portfolio hash moves whenever any loan's facts do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::covenant::{self, CovenantStatus};
use super::esg::{self, KpiStatus};
use super::readiness::{self, ReadinessBand};
use super::round_to;
use crate::state::LoanRecord;

/// Number of drivers kept in the rollup.
pub const TOP_DRIVERS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandDistribution {
    pub green: u32,
    pub amber: u32,
    pub red: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CovenantCounts {
    pub compliant: u32,
    pub at_risk: u32,
    pub breach: u32,
    pub unknown: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiCounts {
    pub on_track: u32,
    pub off_track: u32,
    pub no_data: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub issue: String,
    pub loan_count: u32,
}

/// Portfolio fact core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioCore {
    pub portfolio_id: String,
    pub loan_count: u32,
    pub total_commitment: f64,
    pub average_readiness_score: f64,
    pub band_distribution: BandDistribution,
    pub covenant_status_counts: CovenantCounts,
    pub kpi_status_counts: KpiCounts,
    pub loans_with_blocking_issues: u32,
    pub top_drivers: Vec<Driver>,
    pub signals: Vec<String>,
    pub fact_version: u32,
}

/// Derive the portfolio core. Readiness and per-item versions are
/// irrelevant here; only the rollup's own version enters the hash.
pub fn derive(portfolio_id: &str, loans: &[LoanRecord], fact_version: u32) -> PortfolioCore {
    let mut bands = BandDistribution::default();
    let mut covenants = CovenantCounts::default();
    let mut kpis = KpiCounts::default();
    let mut drivers: BTreeMap<String, u32> = BTreeMap::new();
    let mut score_sum = 0u64;
    let mut total_commitment = 0.0;
    let mut loans_with_blocking_issues = 0;

    for loan in loans {
        let core = readiness::derive(loan, 1);
        score_sum += core.readiness_score as u64;
        total_commitment += loan.commitment;

        match core.readiness_band {
            ReadinessBand::Green => bands.green += 1,
            ReadinessBand::Amber => bands.amber += 1,
            ReadinessBand::Red => bands.red += 1,
        }

        if !core.blocking_issues.is_empty() {
            loans_with_blocking_issues += 1;
        }
        let mut seen: Vec<&String> = core.blocking_issues.iter().collect();
        seen.sort();
        seen.dedup();
        for issue in seen {
            *drivers.entry(issue.clone()).or_insert(0) += 1;
        }

        for c in &loan.covenants {
            match covenant::evaluate(c).0 {
                CovenantStatus::Compliant => covenants.compliant += 1,
                CovenantStatus::AtRisk => covenants.at_risk += 1,
                CovenantStatus::Breach => covenants.breach += 1,
                CovenantStatus::Unknown => covenants.unknown += 1,
            }
        }

        for k in &loan.kpis {
            match esg::evaluate(k).0 {
                KpiStatus::OnTrack => kpis.on_track += 1,
                KpiStatus::OffTrack => kpis.off_track += 1,
                KpiStatus::NoData => kpis.no_data += 1,
            }
        }
    }

    // Most frequent first, ties alphabetical (BTreeMap order + stable sort)
    let mut top_drivers: Vec<Driver> = drivers
        .into_iter()
        .map(|(issue, loan_count)| Driver { issue, loan_count })
        .collect();
    top_drivers.sort_by(|a, b| b.loan_count.cmp(&a.loan_count));
    top_drivers.truncate(TOP_DRIVERS);

    let mut signals = Vec::new();
    if loans.is_empty() {
        signals.push("No loans in portfolio".to_string());
    }
    if covenants.breach > 0 {
        signals.push(format!("{} covenant breach(es)", covenants.breach));
    }
    if bands.red > 0 {
        signals.push(format!("{} loan(s) in RED readiness band", bands.red));
    }

    let average_readiness_score = if loans.is_empty() {
        0.0
    } else {
        round_to(score_sum as f64 / loans.len() as f64, 1)
    };

    PortfolioCore {
        portfolio_id: portfolio_id.to_string(),
        loan_count: loans.len() as u32,
        total_commitment: round_to(total_commitment, 2),
        average_readiness_score,
        band_distribution: bands,
        covenant_status_counts: covenants,
        kpi_status_counts: kpis,
        loans_with_blocking_issues,
        top_drivers,
        signals,
        fact_version,
    }
}
