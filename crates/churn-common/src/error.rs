//! Error types shared across the churn workspace

use thiserror::Error;

/// Result type alias for configuration handling
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Raised when configuration values cannot be used
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} must not be empty")]
    Empty(String),

    #[error("Invalid schema name '{0}': expected a plain SQL identifier")]
    InvalidIdentifier(String),

    #[error("{0} must be greater than 0")]
    Zero(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            key: "PGPORT".to_string(),
            value: "abc".to_string(),
            reason: "not a port number".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for PGPORT: 'abc' (not a port number)");
    }
}
