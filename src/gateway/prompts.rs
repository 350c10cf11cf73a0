//! # Prompt Registry
//!
//! Versioned, pure prompt templates. A template is identified by
//! `(id, version)` and renders the same text for the same variables, so the
//! redacted-prompt checksum is reproducible.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateId {
    ExplainTradingReadiness,
    ExplainEsgKpi,
    ExplainCovenant,
    ExplainPortfolioRisk,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::ExplainTradingReadiness => "EXPLAIN_TRADING_READINESS",
            TemplateId::ExplainEsgKpi => "EXPLAIN_ESG_KPI",
            TemplateId::ExplainCovenant => "EXPLAIN_COVENANT",
            TemplateId::ExplainPortfolioRisk => "EXPLAIN_PORTFOLIO_RISK",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extra guard rails for covenant prompts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyFlags {
    pub no_legal_interpretation: bool,
    pub no_new_obligations: bool,
    pub explain_from_facts_only: bool,
}

impl SafetyFlags {
    pub fn strict() -> Self {
        Self {
            no_legal_interpretation: true,
            no_new_obligations: true,
            explain_from_facts_only: true,
        }
    }
}

/// Variables every template renders
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateVars {
    pub facts: Value,
    pub audience: String,
    pub verbosity: String,
    pub safety: Option<SafetyFlags>,
}

/// A registered template
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub id: TemplateId,
    pub version: u32,
    pub description: &'static str,
    render: fn(&TemplateVars) -> String,
}

impl PromptTemplate {
    pub fn render(&self, vars: &TemplateVars) -> String {
        (self.render)(vars)
    }
}

/// Template metadata for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub id: TemplateId,
    pub version: u32,
    pub description: &'static str,
}

const OUTPUT_SCHEMA: &str = r#"REQUIRED OUTPUT JSON SCHEMA:
{
  "summary": string,
  "explanation": string[],
  "recommendations": string[],
  "confidence": "HIGH" | "MEDIUM" | "LOW",
  "version": 1
}"#;

fn frame(role: &str, rules: &str, vars: &TemplateVars, preamble: Option<String>) -> String {
    let mut out = String::new();
    out.push_str(role);
    out.push_str("\n\n");
    out.push_str(rules);
    out.push_str("\n\n");
    if let Some(preamble) = preamble {
        out.push_str(&preamble);
        out.push_str("\n\n");
    }
    out.push_str(&format!("AUDIENCE: {}\nVERBOSITY: {}\n\n", vars.audience, vars.verbosity));
    out.push_str(OUTPUT_SCHEMA);
    out.push_str(&format!("\n\nFACTS (immutable):\n{:#}\n\nReturn JSON only.", vars.facts));
    out
}

fn render_trading_v1(vars: &TemplateVars) -> String {
    frame(
        "You explain trading readiness facts for a loan platform.",
        "RULES:\n\
         - Use only the FACTS below; never invent or assume values.\n\
         - Do not change scores, bands or statuses.\n\
         - Say so explicitly when information is missing.\n\
         - Output valid JSON matching the schema.",
        vars,
        None,
    )
}

fn render_esg_v1(vars: &TemplateVars) -> String {
    frame(
        "You explain ESG KPI facts for a sustainability-linked loan.",
        "RULES:\n\
         - Use only the FACTS below; never invent measurements or evidence.\n\
         - Distinguish verified from unverified data.\n\
         - Do not make claims about sustainability outcomes beyond the facts.\n\
         - Output valid JSON matching the schema.",
        vars,
        None,
    )
}

fn render_covenant_v1(vars: &TemplateVars) -> String {
    let flags = vars.safety.unwrap_or_default();
    let flags = serde_json::to_value(flags).unwrap_or(Value::Null);
    frame(
        "You explain covenant monitoring facts.",
        "SAFETY RULES:\n\
         - Do not interpret legal text or infer obligations beyond the evaluated rule.\n\
         - Explain using threshold, observed values, delta, severity and source refs only.\n\
         - Say so explicitly when information is missing.\n\
         - Output valid JSON matching the schema.",
        vars,
        Some(format!("SAFETY FLAGS:\n{:#}", flags)),
    )
}

fn render_portfolio_v1(vars: &TemplateVars) -> String {
    frame(
        "You explain portfolio risk aggregates across a tenant's loans.",
        "RULES:\n\
         - Use only the aggregate FACTS below; do not speculate about individual borrowers.\n\
         - Rank drivers as given; do not reorder or rescore them.\n\
         - Output valid JSON matching the schema.",
        vars,
        None,
    )
}

static TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        id: TemplateId::ExplainTradingReadiness,
        version: 1,
        description: "Explain deterministic trading readiness facts",
        render: render_trading_v1,
    },
    PromptTemplate {
        id: TemplateId::ExplainEsgKpi,
        version: 1,
        description: "Explain ESG KPI measurement, evidence and verification facts",
        render: render_esg_v1,
    },
    PromptTemplate {
        id: TemplateId::ExplainCovenant,
        version: 1,
        description: "Explain covenant evaluation from thresholds and observed metrics",
        render: render_covenant_v1,
    },
    PromptTemplate {
        id: TemplateId::ExplainPortfolioRisk,
        version: 1,
        description: "Explain portfolio risk aggregates and drivers",
        render: render_portfolio_v1,
    },
];

pub fn get_template(id: TemplateId, version: u32) -> GatewayResult<&'static PromptTemplate> {
    TEMPLATES
        .iter()
        .find(|t| t.id == id && t.version == version)
        .ok_or_else(|| GatewayError::TemplateNotFound {
            id: id.to_string(),
            version,
        })
}

pub fn render_prompt(id: TemplateId, version: u32, vars: &TemplateVars) -> GatewayResult<String> {
    Ok(get_template(id, version)?.render(vars))
}

pub fn list_templates() -> Vec<TemplateInfo> {
    TEMPLATES
        .iter()
        .map(|t| TemplateInfo {
            id: t.id,
            version: t.version,
            description: t.description,
        })
        .collect()
}
