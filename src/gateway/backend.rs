//! Generation backends
//!
//! A backend turns a redacted prompt into structured JSON. The demo backend
//! is deterministic and can be told to fail, which drives the fallback and
//! timeout paths in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::GenerationError;

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Raw backend output before schema validation
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub model: String,
    pub usage: Option<Usage>,
    pub json: Value,
}

/// Structured-output generation
pub trait GenerationBackend: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        model: &'a str,
    ) -> BoxFuture<'a, Result<BackendResponse, GenerationError>>;
}

/// How the demo backend misbehaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    #[default]
    Never,
    AlwaysTransient,
    AlwaysPermanent,
    /// Succeeds with output that fails schema validation
    InvalidOutput,
    /// Never answers
    Hang,
}

/// Deterministic backend for local runs and tests
#[derive(Debug)]
pub struct DemoBackend {
    name: String,
    mode: FailureMode,
    calls: AtomicU64,
}

impl DemoBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_mode(name, FailureMode::Never)
    }

    pub fn with_mode(name: impl Into<String>, mode: FailureMode) -> Self {
        Self {
            name: name.into(),
            mode,
            calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of generate calls received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn output(&self, model: &str) -> Value {
        json!({
            "summary": format!("Demo explanation via {} using model {}.", self.name, model),
            "explanation": [
                "The facts snapshot was evaluated against the configured thresholds.",
                "Contributing factors are listed in order of impact.",
                "No values outside the supplied facts were used.",
            ],
            "recommendations": [
                "Review the blocking items first.",
                "Recompute after the underlying records change.",
            ],
            "confidence": "HIGH",
            "version": 1,
        })
    }
}

impl GenerationBackend for DemoBackend {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        model: &'a str,
    ) -> BoxFuture<'a, Result<BackendResponse, GenerationError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        async move {
            match self.mode {
                FailureMode::AlwaysTransient => {
                    return Err(GenerationError::transient(format!("{} unavailable", self.name)))
                }
                FailureMode::AlwaysPermanent => {
                    return Err(GenerationError::permanent(format!("{} rejected request", self.name)))
                }
                FailureMode::Hang => {
                    // Outlasts any sane gateway timeout
                    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                    return Err(GenerationError::transient("hang elapsed"));
                }
                FailureMode::InvalidOutput => {
                    return Ok(BackendResponse {
                        model: model.to_string(),
                        usage: None,
                        json: json!({ "summary": "", "explanation": [], "version": 2 }),
                    })
                }
                FailureMode::Never => {}
            }

            tracing::trace!(backend = %self.name, prompt_len = prompt.len(), "demo generate");
            Ok(BackendResponse {
                model: model.to_string(),
                usage: Some(Usage::default()),
                json: self.output(model),
            })
        }
        .boxed()
    }
}
