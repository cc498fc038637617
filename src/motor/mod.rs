// Motor control module for the tracked base
//
// Provides:
// - Hoverboard controller serial protocol (command packets, CRC)
// - Throttle mapping onto controller speed/duty ranges
// - Telemetry frame recovery (battery voltage)
// - Serial link and the high-level motor controller

mod controller;
pub mod link;
pub mod protocol;
pub mod telemetry;
pub mod throttle;

#[cfg(test)]
pub(crate) mod mock;

pub use controller::{DriveError, MotorController, MotorSide, MotorState, StaleCheck};
pub use link::{LinkError, Port, SerialLink};
pub use protocol::{compute_crc, encode_command, CommandPacket, ProtocolError};
pub use telemetry::{find_voltage, TelemetryExtractor};
pub use throttle::{ThrottleError, ThrottleMap};
