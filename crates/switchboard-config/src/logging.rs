//! Logging configuration and tracing subscriber setup.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable multi-field lines
    #[default]
    Text,
    /// Abbreviated single-line output
    Compact,
    /// Newline-delimited JSON objects
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::invalid(
                "logging.format",
                format!("unknown log format '{other}'"),
            )),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive (`info`, `switchboard_core=debug`, ...)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Set the level or filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Check the level string.
    ///
    /// A bare word must be one of the known levels. Anything containing a
    /// directive separator is left to `EnvFilter` to interpret.
    pub fn validate(&self) -> Result<()> {
        let level = self.level.trim();
        if level.is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }
        if !level.contains('=') && !level.contains(',') {
            let lowered = level.to_ascii_lowercase();
            if !LEVELS.contains(&lowered.as_str()) {
                return Err(ConfigError::invalid(
                    "logging.level",
                    format!("unknown level '{level}'"),
                ));
            }
        }
        Ok(())
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `Ok(false)`
/// when a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    config.validate()?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::Logging(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    match installed {
        Ok(()) => {
            tracing::debug!(level = %config.level, format = %config.format, "Logging initialized");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let config = LoggingConfig::default().with_level("loud");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "logging.level"
        ));
    }

    #[test]
    fn test_validate_accepts_directives() {
        let config = LoggingConfig::default().with_level("switchboard_core=trace,warn");
        assert!(config.validate().is_ok());

        let config = LoggingConfig::default().with_level("DEBUG");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default().with_level("warn");
        let _ = init_logging(&config).unwrap();
        // Only one global subscriber can ever be installed per process.
        assert!(!init_logging(&config).unwrap());
    }
}
