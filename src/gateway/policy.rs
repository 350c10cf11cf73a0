//! Request policy for generation calls

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::GatewayError;

/// Business module a call is billed and rate-limited against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Module {
    Trading,
    Esg,
    Servicing,
    Portfolio,
    /// Anything not covered above; gets the default model and limit
    General,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Trading => "TRADING",
            Module::Esg => "ESG",
            Module::Servicing => "SERVICING",
            Module::Portfolio => "PORTFOLIO",
            Module::General => "GENERAL",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verbosity {
    Short,
    Standard,
    Detailed,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Short => "SHORT",
            Verbosity::Standard => "STANDARD",
            Verbosity::Detailed => "DETAILED",
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Standard
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHORT" => Ok(Verbosity::Short),
            "STANDARD" => Ok(Verbosity::Standard),
            "DETAILED" => Ok(Verbosity::Detailed),
            other => Err(GatewayError::Validation(format!("unknown verbosity: {}", other))),
        }
    }
}

/// Purpose, module, audience and verbosity of one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPolicy {
    pub module: Module,
    /// Role-derived audience, e.g. TRADING_ANALYST
    pub audience: String,
    pub verbosity: Verbosity,
}

impl LlmPolicy {
    /// Only purpose this crate issues calls for.
    pub const PURPOSE: &'static str = "EXPLAINABILITY";

    pub fn new(module: Module, audience: impl Into<String>, verbosity: Verbosity) -> Self {
        Self {
            module,
            audience: audience.into(),
            verbosity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_parse() {
        assert_eq!("detailed".parse::<Verbosity>().unwrap(), Verbosity::Detailed);
        assert!("LOUD".parse::<Verbosity>().is_err());
        assert_eq!(Verbosity::default(), Verbosity::Standard);
    }

    #[test]
    fn test_module_serde() {
        assert_eq!(serde_json::to_value(Module::Servicing).unwrap(), "SERVICING");
        assert_eq!(Module::Esg.to_string(), "ESG");
    }
}
