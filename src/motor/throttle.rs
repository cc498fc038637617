// Throttle mapping
// Converts a normalized throttle in [-1, 1] into a controller magnitude
// (wire speed or ESC duty cycle). Forward and reverse ranges may differ.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThrottleError {
    #[error("Throttle is NaN")]
    NotANumber,

    #[error("Invalid throttle range: min={min}, neutral={neutral}, max={max}")]
    InvalidRange { min: f64, neutral: f64, max: f64 },
}

/// Map a throttle onto `[min_mag, max_mag]`, piecewise-linear around `neutral`
///
/// Out-of-range throttles are clamped. `map(0.0) == neutral` exactly and the
/// endpoints map exactly onto `min_mag`/`max_mag`.
pub fn map(throttle: f64, min_mag: f64, neutral: f64, max_mag: f64) -> Result<f64, ThrottleError> {
    if throttle.is_nan() {
        return Err(ThrottleError::NotANumber);
    }

    let t = throttle.clamp(-1.0, 1.0);
    let value = if t == 1.0 {
        max_mag
    } else if t == -1.0 {
        min_mag
    } else if t >= 0.0 {
        neutral + (max_mag - neutral) * t
    } else {
        neutral + (neutral - min_mag) * t
    };

    Ok(value)
}

/// Per-side magnitude range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleMap {
    pub min: f64,
    pub neutral: f64,
    pub max: f64,
}

impl ThrottleMap {
    /// Symmetric integer-speed range: `[-max_speed, max_speed]` around zero
    pub fn symmetric(max_speed: f64) -> Self {
        Self {
            min: -max_speed,
            neutral: 0.0,
            max: max_speed,
        }
    }

    /// Check the range is finite and ordered, which keeps the mapping monotonic
    pub fn validate(&self) -> Result<(), ThrottleError> {
        let finite = self.min.is_finite() && self.neutral.is_finite() && self.max.is_finite();
        if !finite || self.min > self.neutral || self.neutral > self.max {
            return Err(ThrottleError::InvalidRange {
                min: self.min,
                neutral: self.neutral,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn map(&self, throttle: f64) -> Result<f64, ThrottleError> {
        map(throttle, self.min, self.neutral, self.max)
    }

    /// Map to a rounded wire speed, saturated into the `i16` range
    pub fn to_speed(&self, throttle: f64) -> Result<i16, ThrottleError> {
        let value = self.map(throttle)?.round();
        // `as` saturates float -> int conversions
        Ok(value as i16)
    }
}

impl Default for ThrottleMap {
    fn default() -> Self {
        Self::symmetric(crate::config::DEFAULT_MAX_SPEED as f64)
    }
}
