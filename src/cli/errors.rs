//! CLI-specific error types
//!
//! Every CLI error is fatal: printed to stderr, exit code 1.

use std::fmt;
use std::io;

use crate::errors::FactlineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    IoError,
    BootFailed,
    /// The pipeline rejected or failed the command
    CommandFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "FACTLINE_CLI_CONFIG_ERROR",
            Self::IoError => "FACTLINE_CLI_IO_ERROR",
            Self::BootFailed => "FACTLINE_CLI_BOOT_FAILED",
            Self::CommandFailed => "FACTLINE_CLI_COMMAND_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<FactlineError> for CliError {
    fn from(e: FactlineError) -> Self {
        match e {
            FactlineError::Config(m) => Self::config_error(m),
            other => Self::new(CliErrorCode::CommandFailed, format!("{} ({})", other, other.code())),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err: CliError = FactlineError::NotFound("loan L1".into()).into();
        assert_eq!(err.code(), &CliErrorCode::CommandFailed);
        assert!(err.to_string().starts_with("FACTLINE_CLI_COMMAND_FAILED"));
        assert!(err.message().contains("NOT_FOUND"));
    }
}
