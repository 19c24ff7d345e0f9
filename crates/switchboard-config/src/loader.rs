//! Configuration loading from files, strings and the environment.

use crate::config::SwitchboardConfig;
use crate::error::{ConfigError, Result};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SWITCHBOARD_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "SWITCHBOARD_LOG_FORMAT";
/// Environment variable overriding `idle.recheck_interval_ms`.
pub const ENV_IDLE_RECHECK_MS: &str = "SWITCHBOARD_IDLE_RECHECK_MS";
/// Environment variable overriding `idle.budget_ms` (`none` clears it).
pub const ENV_IDLE_BUDGET_MS: &str = "SWITCHBOARD_IDLE_BUDGET_MS";

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (`.toml`)
    Toml,
    /// JSON (`.json`)
    Json,
    /// YAML (`.yaml`, `.yml`)
    Yaml,
}

impl ConfigFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(if other.is_empty() {
                path.display().to_string()
            } else {
                other.to_string()
            })),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Toml => write!(f, "toml"),
            ConfigFormat::Json => write!(f, "json"),
            ConfigFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Loads [`SwitchboardConfig`] values.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse configuration text in the given format.
    pub fn parse_str(text: &str, format: ConfigFormat) -> Result<SwitchboardConfig> {
        match format {
            ConfigFormat::Json => {
                serde_json::from_str(text).map_err(|e| ConfigError::parse(format.to_string(), e))
            }
            #[cfg(feature = "toml")]
            ConfigFormat::Toml => {
                toml::from_str(text).map_err(|e| ConfigError::parse(format.to_string(), e))
            }
            #[cfg(feature = "yaml")]
            ConfigFormat::Yaml => {
                serde_yaml::from_str(text).map_err(|e| ConfigError::parse(format.to_string(), e))
            }
            #[allow(unreachable_patterns)]
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Read and parse a configuration file. The format follows the extension.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<SwitchboardConfig> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), %format, "Loading configuration");
        Self::parse_str(&text, format)
    }

    /// Load defaults or a file, apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<SwitchboardConfig> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => SwitchboardConfig::default(),
        };
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SWITCHBOARD_*` environment overrides.
    ///
    /// Returns the names of the variables that were applied.
    pub fn apply_env_overrides(config: &mut SwitchboardConfig) -> Result<Vec<&'static str>> {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(
        config: &mut SwitchboardConfig,
        lookup: F,
    ) -> Result<Vec<&'static str>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.logging.level = level;
            applied.push(ENV_LOG_LEVEL);
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.logging.format = format.parse()?;
            applied.push(ENV_LOG_FORMAT);
        }

        if let Some(recheck) = lookup(ENV_IDLE_RECHECK_MS) {
            config.idle.recheck_interval_ms = parse_millis(ENV_IDLE_RECHECK_MS, &recheck)?;
            applied.push(ENV_IDLE_RECHECK_MS);
        }

        if let Some(budget) = lookup(ENV_IDLE_BUDGET_MS) {
            config.idle.budget_ms = if budget.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_millis(ENV_IDLE_BUDGET_MS, &budget)?)
            };
            applied.push(ENV_IDLE_BUDGET_MS);
        }

        if !applied.is_empty() {
            debug!(overrides = ?applied, "Applied environment overrides");
        }

        Ok(applied)
    }
}

fn parse_millis(var: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(var, format!("'{raw}' is not a millisecond count: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/switchboard.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("conf.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("conf.ini")),
            Err(ConfigError::UnsupportedFormat(ref ext)) if ext == "ini"
        ));
        assert!(ConfigFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_parse_json_partial() {
        let config =
            ConfigLoader::parse_str(r#"{"idle": {"budget_ms": 250}}"#, ConfigFormat::Json).unwrap();
        assert_eq!(config.idle.budget_ms, Some(250));
        assert!(config.idle.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = ConfigLoader::parse_str("{not json", ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref format, .. } if format == "json"));
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = SwitchboardConfig::default();
        let applied = ConfigLoader::apply_overrides_from(
            &mut config,
            lookup(&[
                (ENV_LOG_LEVEL, "debug"),
                (ENV_LOG_FORMAT, "json"),
                (ENV_IDLE_RECHECK_MS, "50"),
                (ENV_IDLE_BUDGET_MS, "1500"),
            ]),
        )
        .unwrap();

        assert_eq!(applied.len(), 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.idle.recheck_interval_ms, 50);
        assert_eq!(config.idle.budget_ms, Some(1500));
    }

    #[test]
    fn test_budget_override_none_clears() {
        let mut config = SwitchboardConfig::default();
        config.idle.budget_ms = Some(10);
        ConfigLoader::apply_overrides_from(&mut config, lookup(&[(ENV_IDLE_BUDGET_MS, "None")]))
            .unwrap();
        assert_eq!(config.idle.budget_ms, None);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = SwitchboardConfig::default();
        let err = ConfigLoader::apply_overrides_from(
            &mut config,
            lookup(&[(ENV_IDLE_RECHECK_MS, "soon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_IDLE_RECHECK_MS));
    }
}
