//! Timing configuration for the transition engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors loading engine or effect configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON")]
    Json(#[from] serde_json::Error),
}

/// Fixed delays between transition phases.
///
/// Durations are kept finite and non-negative: NaN and infinities fall back to
/// the defaults and negative values become 0. Loading and the builder setters
/// apply this; [`TransitionEngine::new`](super::TransitionEngine::new) applies
/// it again for values assigned to the public fields directly.
///
/// # Example
///
/// ```
/// use veil::scene::EngineConfig;
///
/// let config = EngineConfig::new().hold_pause(0.2).settle_ticks(4);
/// assert_eq!(config.settle_ticks, 4);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long the fully-covered frame is held before switching scenes, in seconds.
    pub hold_pause: f32,
    /// Delay after the scene switch before capturing the incoming scene, in seconds.
    pub settle_delay: f32,
    /// Minimum ticks after the scene switch before capturing the incoming scene.
    pub settle_ticks: u32,
    /// Longest a capture may stay unresolved before it counts as failed, in seconds.
    pub capture_timeout: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_pause: 0.1,
            settle_delay: 0.05,
            settle_ticks: 3,
            capture_timeout: 0.5,
        }
    }
}

impl EngineConfig {
    /// Create a config with the default delays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Set how long the covered frame is held before the scene switch.
    pub fn hold_pause(mut self, seconds: f32) -> Self {
        self.hold_pause = seconds;
        self.sanitized()
    }

    /// Set the delay between the scene switch and the "after" capture.
    pub fn settle_delay(mut self, seconds: f32) -> Self {
        self.settle_delay = seconds;
        self.sanitized()
    }

    /// Set the minimum number of frames rendered before the "after" capture.
    pub fn settle_ticks(mut self, ticks: u32) -> Self {
        self.settle_ticks = ticks;
        self
    }

    /// Set how long a capture may stay unresolved before it counts as failed.
    pub fn capture_timeout(mut self, seconds: f32) -> Self {
        self.capture_timeout = seconds;
        self.sanitized()
    }

    /// Replace non-finite delays with the defaults and clamp negatives to 0.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            hold_pause: seconds_or(self.hold_pause, defaults.hold_pause),
            settle_delay: seconds_or(self.settle_delay, defaults.settle_delay),
            settle_ticks: self.settle_ticks,
            capture_timeout: seconds_or(self.capture_timeout, defaults.capture_timeout),
        }
    }
}

fn seconds_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "settle_ticks": 5 }"#).unwrap();
        assert_eq!(config.settle_ticks, 5);
        assert_eq!(config.hold_pause, 0.1);
    }

    #[test]
    fn degenerate_delays_are_sanitized() {
        let config = EngineConfig::new()
            .capture_timeout(f32::NAN)
            .hold_pause(-1.0)
            .settle_delay(f32::INFINITY);
        assert_eq!(config.capture_timeout, 0.5);
        assert_eq!(config.hold_pause, 0.0);
        assert_eq!(config.settle_delay, 0.05);

        let direct = EngineConfig {
            capture_timeout: f32::NEG_INFINITY,
            ..EngineConfig::default()
        };
        assert_eq!(direct.sanitized().capture_timeout, 0.5);
    }

    #[test]
    fn negative_json_delays_clamp_to_zero() {
        let config = EngineConfig::from_json_str(r#"{ "capture_timeout": -3.0 }"#).unwrap();
        assert_eq!(config.capture_timeout, 0.0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ nope"),
            Err(ConfigError::Json(_))
        ));
    }
}
