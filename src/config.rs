//! Scheduler configuration module
//!
//! Parses and manages timer scheduler configuration from YAML files.
//!
//! Uses serde_yaml for parsing - every field has a serde default, so an empty
//! document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound for the driver tick rate (ms). Anything slower is a typo.
pub const TICK_RATE_MAX_MS: u64 = 1000;

/// What the registry does with a timer whose callback failed or panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackFailurePolicy {
    /// The failing timer requests its own removal (drained next tick).
    #[default]
    Stop,
    /// The failing timer stays live and re-arms with its previous interval.
    /// Timers with interval 0 are still stopped.
    KeepLive,
}

/// Timer scheduler configuration
///
/// Parsed from YAML by serde. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Driver loop period in milliseconds
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,

    /// Interval used by `GameTimer::start()` when none is given
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: i32,

    /// Handling of callbacks that return an error or panic
    #[serde(default)]
    pub on_callback_error: CallbackFailurePolicy,

    /// A registry pass taking longer than this is logged at warn level
    #[serde(default = "default_slow_tick_warn_ms")]
    pub slow_tick_warn_ms: u64,
}

// ============================================
// Default value functions
// These are called by serde when a field is missing
// ============================================

fn default_tick_rate_ms() -> u64 {
    crate::core::SERVER_TICK_RATE_MS
}

fn default_interval_ms() -> i32 {
    crate::timer::DEFAULT_INTERVAL_MS
}

fn default_slow_tick_warn_ms() -> u64 {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: default_tick_rate_ms(),
            default_interval_ms: default_interval_ms(),
            on_callback_error: CallbackFailurePolicy::default(),
            slow_tick_warn_ms: default_slow_tick_warn_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a YAML file
    ///
    /// # Example
    /// ```no_run
    /// use gametick::config::SchedulerConfig;
    ///
    /// let config = SchedulerConfig::from_file("conf/scheduler.yaml")
    ///     .expect("Failed to load config");
    /// println!("tick rate: {}ms", config.tick_rate_ms);
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SchedulerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    ///
    /// Useful for testing
    pub fn from_str(contents: &str) -> Result<Self> {
        // serde_yaml rejects an empty document as a struct; treat it as "all defaults"
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: SchedulerConfig = serde_yaml::from_str(contents)
            .context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.tick_rate_ms > 0, "tick_rate_ms must be positive");
        anyhow::ensure!(
            self.tick_rate_ms <= TICK_RATE_MAX_MS,
            "tick_rate_ms too large: {} (max {})",
            self.tick_rate_ms,
            TICK_RATE_MAX_MS
        );
        anyhow::ensure!(
            self.default_interval_ms >= 0,
            "default_interval_ms cannot be negative: {}",
            self.default_interval_ms
        );

        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SchedulerConfig::from_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.tick_rate_ms, 10);
        assert_eq!(config.default_interval_ms, 500);
        assert_eq!(config.on_callback_error, CallbackFailurePolicy::Stop);
        assert_eq!(config.slow_tick_warn_ms, 50);
    }

    #[test]
    fn test_custom_values() {
        let config = SchedulerConfig::from_str(
            r#"
tick_rate_ms: 25
default_interval_ms: 1000
on_callback_error: keep_live
slow_tick_warn_ms: 5
"#,
        )
        .unwrap();

        assert_eq!(config.tick_rate_ms, 25);
        assert_eq!(config.default_interval_ms, 1000);
        assert_eq!(config.on_callback_error, CallbackFailurePolicy::KeepLive);
        assert_eq!(config.slow_tick_warn_ms, 5);
    }

    #[test]
    fn test_partial_config() {
        let config = SchedulerConfig::from_str("default_interval_ms: 250\n").unwrap();
        assert_eq!(config.default_interval_ms, 250);
        assert_eq!(config.tick_rate_ms, 10);
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        assert!(SchedulerConfig::from_str("tick_rate_ms: 0\n").is_err());
    }

    #[test]
    fn test_huge_tick_rate_rejected() {
        assert!(SchedulerConfig::from_str("tick_rate_ms: 5000\n").is_err());
    }

    #[test]
    fn test_negative_default_interval_rejected() {
        assert!(SchedulerConfig::from_str("default_interval_ms: -1\n").is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(SchedulerConfig::from_str("on_callback_error: explode\n").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let config = SchedulerConfig {
            tick_rate_ms: 20,
            default_interval_ms: 750,
            on_callback_error: CallbackFailurePolicy::KeepLive,
            slow_tick_warn_ms: 100,
        };

        let path = std::env::temp_dir().join(format!(
            "gametick_config_test_{}.yaml",
            std::process::id()
        ));
        config.save(&path).unwrap();

        let loaded = SchedulerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = SchedulerConfig::from_file("/nonexistent/scheduler.yaml");
        assert!(result.is_err());
    }
}
