// Message types exchanged with the command plane

use serde::{Deserialize, Serialize};

use crate::watchdog::WatchdogState;

// Throttle command from teleop/control plane -> runtime
// Missing sides default to zero, same as the `/motor` request body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MotorCommand {
    pub left: f64,
    pub right: f64,
}

impl MotorCommand {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

// Stop request, carries no fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StopCommand {}

/// Drive status published by runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveStatus {
    pub voltage: f64,
    pub stopped: bool,
    pub health: RuntimeHealth,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    LinkDown,
}

impl From<WatchdogState> for RuntimeHealth {
    fn from(state: WatchdogState) -> Self {
        match state {
            WatchdogState::Armed => RuntimeHealth::Ok,
            WatchdogState::Tripped => RuntimeHealth::CmdStale,
        }
    }
}
