//! # Configuration
//!
//! JSON configuration for a factline process. Every field has a default,
//! so an empty object (or a missing file via [`FactlineConfig::load_or_default`])
//! yields a runnable setup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::facts::FactDomain;
use crate::gateway::Module;
use crate::http_server::HttpServerConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactlineConfig {
    #[serde(default)]
    pub http: HttpServerConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub fact_versions: FactVersions,

    #[serde(default)]
    pub redaction: RedactionConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub state: StateConfig,
}

impl FactlineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        for (module, limit) in self.rate_limits.all() {
            if limit.window_seconds == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate limit window for {} must be positive",
                    module
                )));
            }
        }
        if self.gateway.timeout_ms == 0 {
            return Err(ConfigError::Invalid("gateway.timeout_ms must be positive".into()));
        }
        for domain in FactDomain::ALL {
            if self.fact_versions.for_domain(domain) == 0 {
                return Err(ConfigError::Invalid(format!(
                    "fact version for {} must be positive",
                    domain
                )));
            }
        }
        Ok(())
    }
}

// ==================
// Rate limits
// ==================

/// Fixed-window limit for one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window_seconds: u64,
    pub max: u64,
}

impl WindowLimit {
    pub const fn new(window_seconds: u64, max: u64) -> Self {
        Self { window_seconds, max }
    }
}

/// Per-module limits plus a conservative default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_module_limits")]
    pub modules: BTreeMap<String, WindowLimit>,

    #[serde(default = "default_limit")]
    pub default: WindowLimit,
}

fn default_module_limits() -> BTreeMap<String, WindowLimit> {
    let mut limits = BTreeMap::new();
    limits.insert(Module::Trading.as_str().to_string(), WindowLimit::new(60, 30));
    limits.insert(Module::Esg.as_str().to_string(), WindowLimit::new(60, 20));
    limits.insert(Module::Servicing.as_str().to_string(), WindowLimit::new(60, 20));
    limits.insert(Module::Portfolio.as_str().to_string(), WindowLimit::new(60, 10));
    limits
}

fn default_limit() -> WindowLimit {
    WindowLimit::new(60, 15)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            modules: default_module_limits(),
            default: default_limit(),
        }
    }
}

impl RateLimitConfig {
    /// Limit for a module, falling back to the default
    pub fn for_module(&self, module: Module) -> WindowLimit {
        self.modules
            .get(module.as_str())
            .copied()
            .unwrap_or(self.default)
    }

    /// Override one module's limit
    pub fn with_module(mut self, module: Module, limit: WindowLimit) -> Self {
        self.modules.insert(module.as_str().to_string(), limit);
        self
    }

    fn all(&self) -> impl Iterator<Item = (&str, &WindowLimit)> {
        self.modules
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(std::iter::once(("default", &self.default)))
    }
}

// ==================
// Fact versions
// ==================

/// Per-domain fact version. Bumping one changes every hash in that domain,
/// which makes every cached explanation for it miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactVersions {
    #[serde(default = "default_version")]
    pub readiness: u32,
    #[serde(default = "default_version")]
    pub covenant: u32,
    #[serde(default = "default_version")]
    pub esg_kpi: u32,
    #[serde(default = "default_version")]
    pub portfolio: u32,
}

fn default_version() -> u32 {
    1
}

impl Default for FactVersions {
    fn default() -> Self {
        Self {
            readiness: 1,
            covenant: 1,
            esg_kpi: 1,
            portfolio: 1,
        }
    }
}

impl FactVersions {
    pub fn for_domain(&self, domain: FactDomain) -> u32 {
        match domain {
            FactDomain::Readiness => self.readiness,
            FactDomain::Covenant => self.covenant,
            FactDomain::EsgKpi => self.esg_kpi,
            FactDomain::Portfolio => self.portfolio,
        }
    }
}

// ==================
// Redaction
// ==================

/// One redaction class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionPatternConfig {
    pub category: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

/// Ordered redaction classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<RedactionPatternConfig>,
}

fn default_redaction_patterns() -> Vec<RedactionPatternConfig> {
    vec![
        RedactionPatternConfig {
            category: "emails".into(),
            pattern: r"\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b".into(),
            replacement: "[REDACTED_EMAIL]".into(),
            case_insensitive: true,
        },
        RedactionPatternConfig {
            category: "phone_numbers".into(),
            pattern: r"(\+?\d[\d\s\-().]{7,}\d)".into(),
            replacement: "[REDACTED_PHONE]".into(),
            case_insensitive: false,
        },
        RedactionPatternConfig {
            category: "long_tokens".into(),
            pattern: r"\b[a-f0-9]{32,}\b".into(),
            replacement: "[REDACTED_TOKEN]".into(),
            case_insensitive: true,
        },
    ]
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            patterns: default_redaction_patterns(),
        }
    }
}

// ==================
// Gateway, audit, state
// ==================

/// Generation gateway settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Upper bound on a single backend call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_primary_name")]
    pub primary_name: String,

    #[serde(default = "default_fallback_name")]
    pub fallback_name: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_primary_name() -> String {
    "DEMO_PRIMARY".to_string()
}

fn default_fallback_name() -> String {
    "DEMO_FALLBACK".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            primary_name: default_primary_name(),
            fallback_name: default_fallback_name(),
        }
    }
}

/// Audit sink settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines audit file; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Business state settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// JSON seed of tenants and loans loaded at startup
    #[serde(default)]
    pub seed_path: Option<PathBuf>,

    /// Tenants refreshed by the nightly schedule
    #[serde(default)]
    pub scheduled_tenants: Vec<String>,
}
