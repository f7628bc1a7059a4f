use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::time::Duration;

use crate::error::{ConfigError, TimerError};
use crate::timer::period_from_secs;

/// Tracker configuration, loaded from JSON. Missing fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub positions: PositionConfig,
    pub inactivity: InactivityConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Fixes less accurate than this are dropped before accumulation
    pub max_horizontal_accuracy_m: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InactivityConfig {
    /// Idle time before an alert is dispatched
    pub threshold_secs: f64,
    /// Motion magnitudes at or below this count as stillness
    pub motion_epsilon: f64,
    pub check_interval_secs: f64,
}

impl InactivityConfig {
    pub fn check_interval(&self) -> Result<Duration, TimerError> {
        period_from_secs(self.check_interval_secs)
    }
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 300.0,
            motion_epsilon: 0.05,
            check_interval_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout_secs: 15,
            user_agent: format!("slope_tracker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TrackerConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: TrackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("positions.max_horizontal_accuracy_m", self.positions.max_horizontal_accuracy_m)?;
        positive("inactivity.threshold_secs", self.inactivity.threshold_secs)?;
        positive("inactivity.check_interval_secs", self.inactivity.check_interval_secs)?;

        let epsilon = self.inactivity.motion_epsilon;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "inactivity.motion_epsilon must be a finite non-negative number, got {}",
                epsilon
            )));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is empty".to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be a finite positive number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inactivity.threshold_secs, 300.0);
        assert_eq!(config.inactivity.motion_epsilon, 0.05);
        assert_eq!(config.inactivity.check_interval(), Ok(Duration::from_secs(5)));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "inactivity": { "threshold_secs": 120 }, "api": { "base_url": "https://api.example.org" } }"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.inactivity.threshold_secs, 120.0);
        assert_eq!(config.inactivity.motion_epsilon, 0.05);
        assert_eq!(config.api.base_url, "https://api.example.org");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.positions.max_horizontal_accuracy_m, 50.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = TrackerConfig::default();
        config.inactivity.threshold_secs = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = TrackerConfig::default();
        config.inactivity.motion_epsilon = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.api.base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_check_interval_is_an_error() {
        let mut config = InactivityConfig::default();
        for secs in [0.0, -5.0, f64::INFINITY] {
            config.check_interval_secs = secs;
            assert_eq!(config.check_interval(), Err(TimerError::InvalidPeriod(secs)));
        }
        config.check_interval_secs = f64::NAN;
        assert!(matches!(config.check_interval(), Err(TimerError::InvalidPeriod(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("slope_tracker_config_{}.json", std::process::id()));
        fs::write(&path, r#"{ "positions": { "max_horizontal_accuracy_m": 25 } }"#).unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.positions.max_horizontal_accuracy_m, 25.0);

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(TrackerConfig::load(&path), Err(ConfigError::Parse(_))));

        let _ = fs::remove_file(&path);
        assert!(matches!(TrackerConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
