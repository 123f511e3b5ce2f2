use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How to pick among several candidates that all pass strict validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First candidate in resolver priority order.
    #[default]
    ResolverOrder,
    /// Candidate closest in document order to the previous step's target.
    /// Falls back to resolver order when there is no previous target.
    NearestPrevious,
}

fn default_check_interval_ms() -> u64 {
    500
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_viewport_margin_px() -> f64 {
    1000.0
}
fn default_navigation_debounce_ms() -> u64 {
    50
}
fn default_true() -> bool {
    true
}

/// Engine tuning knobs. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum time between two validation loop checks.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Cadence of the spawned watch task.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Extra space around the viewport inside which a target counts as visible.
    #[serde(default = "default_viewport_margin_px")]
    pub viewport_margin_px: f64,

    /// Settle time before re-entering the scheduler after a navigation.
    #[serde(default = "default_navigation_debounce_ms")]
    pub navigation_debounce_ms: u64,

    /// Delay after a completed interaction before checking whether it
    /// navigated. Zero means a single cooperative yield.
    #[serde(default)]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub tie_break: TieBreak,

    /// Spawn the validation loop automatically when a target is bound.
    #[serde(default = "default_true")]
    pub auto_watch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            viewport_margin_px: default_viewport_margin_px(),
            navigation_debounce_ms: default_navigation_debounce_ms(),
            settle_delay_ms: 0,
            tie_break: TieBreak::default(),
            auto_watch: true,
        }
    }
}

impl EngineConfig {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse config from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: EngineConfig = if yaml.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_ms == 0 {
            return Err(Error::Config("check_interval_ms must be at least 1".into()));
        }
        if self.frame_interval_ms == 0 {
            return Err(Error::Config("frame_interval_ms must be at least 1".into()));
        }
        if !self.viewport_margin_px.is_finite() || self.viewport_margin_px < 0.0 {
            return Err(Error::Config(
                "viewport_margin_px must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Never zero, even for a config built in code that skipped validation.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    /// Never zero; a zero period would panic the watch task's timer.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn navigation_debounce(&self) -> Duration {
        Duration::from_millis(self.navigation_debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.check_interval(), Duration::from_millis(500));
        assert_eq!(config.navigation_debounce(), Duration::from_millis(50));
        assert_eq!(config.tie_break, TieBreak::ResolverOrder);
        assert!(config.auto_watch);
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
check_interval_ms: 250
tie_break: nearest_previous
auto_watch: false
"#;
        let config = EngineConfig::parse(yaml).unwrap();
        assert_eq!(config.check_interval_ms, 250);
        assert_eq!(config.tie_break, TieBreak::NearestPrevious);
        assert!(!config.auto_watch);
        assert_eq!(config.frame_interval_ms, 16); // default
    }

    #[test]
    fn test_validation_zero_interval() {
        let result = EngineConfig::parse("check_interval_ms: 0");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_intervals_never_zero() {
        let config = EngineConfig {
            check_interval_ms: 0,
            frame_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.check_interval(), Duration::from_millis(1));
        assert_eq!(config.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_validation_negative_margin() {
        assert!(EngineConfig::parse("viewport_margin_px: -5").is_err());
    }

    #[test]
    fn test_unknown_tie_break() {
        assert!(EngineConfig::parse("tie_break: random").is_err());
    }
}
