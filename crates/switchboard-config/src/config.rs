//! Configuration schema for the event engine.

use crate::error::{ConfigError, Result};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Event queue and run loop settings
    pub manager: ManagerConfig,
    /// Idle wait settings
    pub idle: IdleConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl SwitchboardConfig {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        self.idle.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Event queue and run loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound on events dispatched by a single flush (`None` drains the
    /// whole snapshot)
    pub max_events_per_flush: Option<usize>,
    /// Queue length above which a warning is logged on enqueue
    pub queue_warn_threshold: usize,
    /// Stop `run()` once no component is attached
    pub stop_when_detached: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_events_per_flush: None,
            queue_warn_threshold: 10_000,
            stop_when_detached: true,
        }
    }
}

impl ManagerConfig {
    /// Validate the manager section.
    pub fn validate(&self) -> Result<()> {
        if self.max_events_per_flush == Some(0) {
            return Err(ConfigError::invalid(
                "manager.max_events_per_flush",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Idle wait configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Install the fallback idle handler
    pub enabled: bool,
    /// Bounded re-check interval while parked, in milliseconds
    pub recheck_interval_ms: u64,
    /// Idle budget handed to each generate-events cycle (`None` is unbounded)
    pub budget_ms: Option<u64>,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recheck_interval_ms: 1_000,
            budget_ms: None,
        }
    }
}

impl IdleConfig {
    /// Re-check interval as a `Duration`.
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_millis(self.recheck_interval_ms)
    }

    /// Idle budget as a `Duration`, `None` meaning unbounded.
    pub fn budget(&self) -> Option<Duration> {
        self.budget_ms.map(Duration::from_millis)
    }

    /// Set the re-check interval.
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the idle budget.
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget_ms = budget.map(|d| d.as_millis() as u64);
        self
    }

    /// Validate the idle section.
    pub fn validate(&self) -> Result<()> {
        if self.recheck_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "idle.recheck_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SwitchboardConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.idle.enabled);
        assert_eq!(config.idle.recheck_interval(), Duration::from_secs(1));
        assert_eq!(config.idle.budget(), None);
        assert!(config.manager.stop_when_detached);
    }

    #[test]
    fn test_zero_recheck_interval_rejected() {
        let mut config = SwitchboardConfig::default();
        config.idle.recheck_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("idle.recheck_interval_ms"));
    }

    #[test]
    fn test_zero_flush_limit_rejected() {
        let mut config = SwitchboardConfig::default();
        config.manager.max_events_per_flush = Some(0);
        assert!(config.validate().is_err());

        config.manager.max_events_per_flush = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_idle_builders() {
        let idle = IdleConfig::default()
            .with_recheck_interval(Duration::from_millis(25))
            .with_budget(Some(Duration::from_millis(200)));
        assert_eq!(idle.recheck_interval_ms, 25);
        assert_eq!(idle.budget(), Some(Duration::from_millis(200)));
    }
}
