//! Output schema validation for generated explanations

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{GatewayError, GatewayResult};

/// Schema a call's output must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputSchema {
    Standard,
    /// Standard plus an optional disclaimer
    Covenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A validated explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainOutput {
    pub summary: String,
    pub explanation: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub confidence: Confidence,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
}

pub const OUTPUT_VERSION: u32 = 1;

impl OutputSchema {
    /// Parse and check `value`. Unknown fields are dropped.
    pub fn validate(&self, value: &Value) -> GatewayResult<ExplainOutput> {
        let mut output: ExplainOutput = serde_json::from_value(value.clone())
            .map_err(|e| GatewayError::OutputSchemaValidation(e.to_string()))?;

        if output.summary.trim().is_empty() {
            return Err(GatewayError::OutputSchemaValidation("summary is empty".into()));
        }
        if output.explanation.is_empty() {
            return Err(GatewayError::OutputSchemaValidation("explanation is empty".into()));
        }
        if output.explanation.iter().any(|line| line.trim().is_empty()) {
            return Err(GatewayError::OutputSchemaValidation(
                "explanation contains an empty item".into(),
            ));
        }
        if output.version != OUTPUT_VERSION {
            return Err(GatewayError::OutputSchemaValidation(format!(
                "unsupported output version {}",
                output.version
            )));
        }
        if *self == OutputSchema::Standard {
            output.disclaimer = None;
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "summary": "ok",
            "explanation": ["a", "b"],
            "confidence": "MEDIUM",
            "version": 1,
            "disclaimer": "not legal advice",
            "extra": true
        })
    }

    #[test]
    fn test_recommendations_default() {
        let out = OutputSchema::Standard.validate(&valid()).unwrap();
        assert!(out.recommendations.is_empty());
        assert_eq!(out.confidence, Confidence::Medium);
        assert_eq!(out.disclaimer, None);
    }

    #[test]
    fn test_covenant_keeps_disclaimer() {
        let out = OutputSchema::Covenant.validate(&valid()).unwrap();
        assert_eq!(out.disclaimer.as_deref(), Some("not legal advice"));
    }

    #[test]
    fn test_rejections() {
        let mut v = valid();
        v["summary"] = json!("  ");
        assert!(OutputSchema::Standard.validate(&v).is_err());

        let mut v = valid();
        v["explanation"] = json!([]);
        assert!(OutputSchema::Standard.validate(&v).is_err());

        let mut v = valid();
        v["explanation"] = json!(["fine", ""]);
        assert!(OutputSchema::Standard.validate(&v).is_err());

        let mut v = valid();
        v["version"] = json!(2);
        assert!(OutputSchema::Standard.validate(&v).is_err());

        let mut v = valid();
        v["confidence"] = json!("CERTAIN");
        assert!(OutputSchema::Standard.validate(&v).is_err());
    }
}
