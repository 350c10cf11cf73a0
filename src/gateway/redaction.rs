//! # Redaction & Checksum
//!
//! PII is stripped from rendered prompts before they leave the process.
//! Pattern classes run in order, each over the output of the previous one;
//! no replacement token matches any pattern. The provenance checksum is
//! always taken over the redacted text.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::errors::{GatewayError, GatewayResult};
use crate::config::{RedactionConfig, RedactionPatternConfig};
use crate::hashing;

/// One compiled pattern class
#[derive(Debug, Clone)]
pub struct RedactionPattern {
    pub category: String,
    pub replacement: String,
    regex: Regex,
}

impl RedactionPattern {
    pub fn compile(config: &RedactionPatternConfig) -> GatewayResult<Self> {
        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(config.case_insensitive)
            .build()
            .map_err(|e| {
                GatewayError::Validation(format!(
                    "invalid redaction pattern for {}: {}",
                    config.category, e
                ))
            })?;
        Ok(Self {
            category: config.category.clone(),
            replacement: config.replacement.clone(),
            regex,
        })
    }
}

/// Outcome of redacting one text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redaction {
    pub redacted_text: String,
    pub applied: bool,
    /// Categories that matched at least once, in pattern order
    pub categories: Vec<String>,
}

/// Ordered set of pattern classes
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<RedactionPattern>,
}

impl Redactor {
    pub fn from_config(config: &RedactionConfig) -> GatewayResult<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(RedactionPattern::compile)
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn redact(&self, text: &str) -> Redaction {
        let mut current = text.to_string();
        let mut categories = Vec::new();

        for pattern in &self.patterns {
            if pattern.regex.is_match(&current) {
                categories.push(pattern.category.clone());
                current = pattern
                    .regex
                    .replace_all(&current, pattern.replacement.as_str())
                    .into_owned();
            }
        }

        Redaction {
            applied: !categories.is_empty(),
            redacted_text: current,
            categories,
        }
    }
}

/// Provenance checksum of already-redacted text
pub fn checksum(redacted_text: &str) -> String {
    hashing::sha256_hex(redacted_text)
}
