// Timeouts, topics, drive configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::motor::{MotorSide, ThrottleMap};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Watchdog: commands older than the deadline force a stop
pub const DEFAULT_DEADLINE_MS: u64 = 2000;
pub const DEFAULT_POLL_MS: u64 = 100;

// Time given to a zero command to take effect before the port is closed
pub const DEFAULT_SETTLE_MS: u64 = 300;

// Zenoh topics
pub const TOPIC_CMD_MOTOR: &str = "tank/cmd/motor"; // throttle commands
pub const TOPIC_CMD_STOP: &str = "tank/cmd/stop"; // explicit stop
pub const TOPIC_DRIVE_STATE: &str = "tank/state/drive"; // voltage + health

// Serial port for the hoverboard controller board
pub const MOTOR_PORT: &str = "/dev/serial0";
pub const MOTOR_BAUDRATE: u32 = 4800;

// Speed magnitude at full throttle
pub const DEFAULT_MAX_SPEED: i16 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {side:?} range: {source}")]
    Range {
        side: MotorSide,
        source: crate::motor::ThrottleError,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-side output configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SideConfig {
    /// Magnitude range the throttle is mapped onto
    #[serde(flatten)]
    pub range: ThrottleMap,
    /// Flip direction for a motor mounted mirrored
    pub inverted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub port: String,
    pub baudrate: u32,
    pub deadline_ms: u64,
    pub poll_ms: u64,
    pub settle_ms: u64,
    pub left: SideConfig,
    pub right: SideConfig,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            baudrate: MOTOR_BAUDRATE,
            deadline_ms: DEFAULT_DEADLINE_MS,
            poll_ms: DEFAULT_POLL_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            left: SideConfig::default(),
            right: SideConfig::default(),
        }
    }
}

impl DriveConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Invalid("empty port path".into()));
        }
        if self.baudrate == 0 {
            return Err(ConfigError::Invalid("baudrate must be non-zero".into()));
        }
        if self.poll_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be non-zero".into()));
        }
        if self.deadline_ms < self.poll_ms {
            return Err(ConfigError::Invalid(format!(
                "deadline ({} ms) shorter than poll interval ({} ms)",
                self.deadline_ms, self.poll_ms
            )));
        }

        for side in MotorSide::ALL {
            self.side(side)
                .range
                .validate()
                .map_err(|source| ConfigError::Range { side, source })?;
        }
        Ok(())
    }

    pub fn side(&self, side: MotorSide) -> &SideConfig {
        match side {
            MotorSide::Left => &self.left,
            MotorSide::Right => &self.right,
        }
    }

    /// Same speed range on both sides
    pub fn set_max_speed(&mut self, max_speed: i16) {
        let range = ThrottleMap::symmetric(max_speed as f64);
        self.left.range = range;
        self.right.range = range;
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DriveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.deadline(), Duration::from_millis(2000));
        assert_eq!(config.left.range.max, 1000.0);
        assert!(!config.right.inverted);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "port": "/dev/ttyAMA0",
            "baudrate": 19200,
            "deadline_ms": 1000,
            "right": { "inverted": true, "min": -600.0, "max": 800.0 }
        }"#;
        let config: DriveConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.port, "/dev/ttyAMA0");
        assert_eq!(config.baudrate, 19200);
        assert_eq!(config.poll_ms, DEFAULT_POLL_MS);
        assert!(config.right.inverted);
        assert_eq!(config.right.range.min, -600.0);
        assert_eq!(config.right.range.neutral, 0.0);
        assert_eq!(config.right.range.max, 800.0);
        assert_eq!(config.left, SideConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = DriveConfig::default();
        config.deadline_ms = 50;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DriveConfig::default();
        config.left.range.min = 10.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Range {
                side: MotorSide::Left,
                ..
            })
        ));
    }

    #[test]
    fn test_set_max_speed() {
        let mut config = DriveConfig::default();
        config.set_max_speed(400);
        assert_eq!(config.left.range, ThrottleMap::symmetric(400.0));
        assert_eq!(config.right.range, ThrottleMap::symmetric(400.0));
    }
}
