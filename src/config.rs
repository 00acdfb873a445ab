//! HUD configuration
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or no file) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::RenderConfig;
use crate::simulation::SimulationConfig;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid YAML for this schema
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The values parse but cannot be used
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Base URL of the dashboard API
    pub api_base: String,
    /// Snapshot poll period
    pub poll_interval_ms: u64,
    /// Simulation ticks per second
    pub tick_rate_hz: u32,
    /// Per-request timeout for API calls
    pub request_timeout_ms: u64,
    pub physics: SimulationConfig,
    pub render: RenderConfig,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080".to_string(),
            poll_interval_ms: 10_000,
            tick_rate_hz: 60,
            request_timeout_ms: 5_000,
            physics: SimulationConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl HudConfig {
    /// Read and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // serde_yaml reads an empty document as unit, not an empty map
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".into(),
            ));
        }
        let physics = &self.physics;
        let fields = [
            ("center[0]", physics.center[0]),
            ("center[1]", physics.center[1]),
            ("center_strength", physics.center_strength),
            ("repulsion_radius", physics.repulsion_radius),
            ("repulsion_strength", physics.repulsion_strength),
            ("friction", physics.friction),
            ("link_strength", physics.link_strength),
            ("link_distance", physics.link_distance),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "physics.{name} must be finite, got {value}"
            )));
        }
        if physics.repulsion_radius < 0.0 {
            return Err(ConfigError::Invalid(
                "physics.repulsion_radius must not be negative".into(),
            ));
        }
        let [lo, hi] = physics.bounds;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::Invalid(format!(
                "physics.bounds must be an increasing range, got [{lo}, {hi}]"
            )));
        }
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Period of the tick clock (about 16 ms at 60 Hz)
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_hud_constants() {
        let config = HudConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.tick_period(), Duration::from_nanos(16_666_666));
        assert_eq!(config.physics.center, [50.0, 50.0]);
        assert_eq!(config.physics.repulsion_radius, 20.0);
        assert_eq!(config.physics.friction, 0.95);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(HudConfig::from_yaml("").unwrap(), HudConfig::default());
    }

    #[test]
    fn partial_yaml_overrides_selected_fields() {
        let config = HudConfig::from_yaml(
            "api_base: http://sentinel:9000\ntick_rate_hz: 30\nphysics:\n  friction: 0.9\n",
        )
        .unwrap();
        assert_eq!(config.api_base, "http://sentinel:9000");
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.physics.friction, 0.9);
        assert_eq!(config.physics.repulsion_radius, 20.0);
        assert_eq!(config.poll_interval_ms, 10_000);
    }

    #[test]
    fn rejects_zero_tick_rate() {
        let err = HudConfig::from_yaml("tick_rate_hz: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = HudConfig::from_yaml("physics:\n  bounds: [100.0, 0.0]\n").unwrap_err();
        assert!(err.to_string().contains("bounds"));
    }

    #[test]
    fn rejects_non_finite_physics() {
        let err = HudConfig::from_yaml("physics:\n  friction: .nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("physics.friction"), "{err}");

        let err = HudConfig::from_yaml("physics:\n  center: [.inf, 50.0]\n").unwrap_err();
        assert!(err.to_string().contains("physics.center[0]"), "{err}");
    }

    #[test]
    fn rejects_negative_repulsion_radius() {
        let err = HudConfig::from_yaml("physics:\n  repulsion_radius: -1.0\n").unwrap_err();
        assert!(err.to_string().contains("repulsion_radius"), "{err}");
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = HudConfig::from_yaml("tick_rate_hz: [fast]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms: 2500").unwrap();
        let config = HudConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = HudConfig::load(Path::new("/nonexistent/sentinel-hud.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
