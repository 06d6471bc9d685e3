//! Agent errors

use std::fmt;
use thiserror::Error;

/// A rejected configuration parameter.
///
/// Always names the parameter; carries the offending value when the
/// parameter was present but failed its check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub parameter: String,
    pub value: Option<String>,
}

impl ConfigurationError {
    pub fn missing(parameter: &str) -> Self {
        Self {
            parameter: parameter.to_string(),
            value: None,
        }
    }

    pub fn invalid(parameter: &str, value: impl fmt::Display) -> Self {
        Self {
            parameter: parameter.to_string(),
            value: Some(value.to_string()),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "Invalid value {} for parameter '{}'",
                value, self.parameter
            ),
            None => write!(f, "Missing parameter: {}", self.parameter),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum UaError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Configuration source error: {0}")]
    Source(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<config::ConfigError> for UaError {
    fn from(err: config::ConfigError) -> Self {
        UaError::Source(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::missing("uri");
        assert_eq!(err.to_string(), "Missing parameter: uri");

        let err = ConfigurationError::invalid("ws_servers", "[]");
        assert_eq!(
            err.to_string(),
            "Invalid value [] for parameter 'ws_servers'"
        );
    }
}
