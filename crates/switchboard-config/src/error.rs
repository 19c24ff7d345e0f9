//! Error types for configuration loading and validation.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text could not be parsed.
    #[error("Failed to parse {format} configuration: {message}")]
    Parse {
        /// Format that was being parsed
        format: String,
        /// Parser message
        message: String,
    },

    /// The file extension or requested format is not supported by this build.
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// A value failed validation.
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        /// Dotted path of the offending field
        field: String,
        /// Why the value was rejected
        message: String,
    },

    /// The global tracing subscriber could not be installed.
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Create a parse error for the given format.
    pub fn parse(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error for the given field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ConfigError::parse("toml", "expected `=`");
        assert_eq!(
            err.to_string(),
            "Failed to parse toml configuration: expected `=`"
        );
    }

    #[test]
    fn test_invalid_error_display() {
        let err = ConfigError::invalid("idle.recheck_interval_ms", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'idle.recheck_interval_ms': must be greater than zero"
        );
    }
}
