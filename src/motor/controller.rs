// Motor controller for the tracked base
//
// Combines throttle mapping, the command protocol and the serial link into
// a small API shared by the command plane and the safety watchdog. The link
// and the motor state sit behind one lock, so every packet and the state
// change it causes are a single critical section.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::link::{LinkError, SerialLink};
use super::protocol::{encode_command, ProtocolError, DRIVE_STATE};
use super::telemetry::TelemetryExtractor;
use super::throttle::ThrottleError;
use crate::config::{DriveConfig, SideConfig};

/// Upper bound on waiting for the link during cleanup
const CLEANUP_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// One track of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorSide {
    Left,
    Right,
}

impl MotorSide {
    pub const ALL: [MotorSide; 2] = [MotorSide::Left, MotorSide::Right];

    /// Slave ID the controller board uses for this side
    pub const fn slave_id(self) -> u8 {
        match self {
            MotorSide::Left => 0,
            MotorSide::Right => 1,
        }
    }

    const fn index(self) -> usize {
        self.slave_id() as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),
}

pub type Result<T> = std::result::Result<T, DriveError>;

/// Snapshot of the drive state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorState {
    /// Time of the last successful `set_esc`
    pub last_command_time: Instant,
    /// True until a non-zero throttle is sent, and again once every side is at zero
    pub is_stopped: bool,
    /// Last known battery voltage (0.0 until the first telemetry frame)
    pub battery_voltage: f64,
    /// Last commanded (clamped) throttle per side
    pub throttle: [f64; 2],
}

/// Outcome of a watchdog freshness check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaleCheck {
    /// Last command is within the deadline
    Fresh,
    /// Deadline passed but the motors are already stopped
    Idle,
    /// Deadline passed with motors running; a stop was sent
    Tripped { elapsed: Duration },
}

struct Drive {
    link: SerialLink,
    state: MotorState,
    telemetry: TelemetryExtractor,
}

impl Drive {
    fn send(&mut self, side: MotorSide, speed: i16) -> Result<()> {
        let packet = encode_command(side.slave_id(), speed, DRIVE_STATE)?;
        debug!("{:?} track: speed={}", side, packet.speed());
        self.link.write_packet(packet.as_bytes())?;
        Ok(())
    }

    /// Drain feedback bytes and keep the newest voltage reading
    fn poll_telemetry(&mut self) {
        match self.link.read_available() {
            Ok(bytes) => {
                if let Some(voltage) = self.telemetry.feed(&bytes) {
                    debug!("Battery voltage: {:.2} V", voltage);
                    self.state.battery_voltage = voltage;
                }
            }
            Err(LinkError::Closed) => {}
            Err(e) => warn!("Failed to read telemetry: {}", e),
        }
    }
}

/// Drive controller for both tracks
pub struct MotorController {
    drive: Mutex<Drive>,
    sides: [SideConfig; 2],
    settle: Duration,
    cleaned_up: AtomicBool,
}

impl MotorController {
    /// Open the serial link described by `config` and zero both tracks
    pub fn open(config: &DriveConfig) -> Result<Self> {
        let link = SerialLink::open_with_baudrate(&config.port, config.baudrate)?;
        Self::with_link(link, config)
    }

    /// Create a controller on an existing link and zero both tracks
    pub fn with_link(link: SerialLink, config: &DriveConfig) -> Result<Self> {
        let port_name = link.name().to_string();
        let controller = Self {
            drive: Mutex::new(Drive {
                link,
                state: MotorState {
                    last_command_time: Instant::now(),
                    is_stopped: true,
                    battery_voltage: 0.0,
                    throttle: [0.0; 2],
                },
                telemetry: TelemetryExtractor::new(),
            }),
            sides: [*config.side(MotorSide::Left), *config.side(MotorSide::Right)],
            settle: config.settle(),
            cleaned_up: AtomicBool::new(false),
        };

        if let Err(e) = controller.stop() {
            // Nothing was driven yet: skip the final stop and settle on drop
            controller.cleaned_up.store(true, Ordering::SeqCst);
            return Err(e);
        }
        info!("Motor controller ready on {}, both tracks at neutral", port_name);
        Ok(controller)
    }

    fn side_config(&self, side: MotorSide) -> &SideConfig {
        &self.sides[side.index()]
    }

    fn neutral_speed(&self, side: MotorSide) -> Result<i16> {
        Ok(self.side_config(side).range.to_speed(0.0)?)
    }

    /// Command one track
    ///
    /// # Arguments
    /// * `side` - Track to command
    /// * `throttle` - Normalized throttle, positive = forward (clamped to [-1, 1])
    pub fn set_esc(&self, side: MotorSide, throttle: f64) -> Result<()> {
        if throttle.is_nan() {
            return Err(ThrottleError::NotANumber.into());
        }
        let throttle = throttle.clamp(-1.0, 1.0);

        let config = self.side_config(side);
        let directed = if config.inverted { -throttle } else { throttle };
        let speed = config.range.to_speed(directed)?;

        let mut drive = self.drive.lock();
        drive.send(side, speed)?;

        let state = &mut drive.state;
        state.last_command_time = Instant::now();
        state.throttle[side.index()] = throttle;
        state.is_stopped = state.throttle.iter().all(|&t| t == 0.0);

        drive.poll_telemetry();
        Ok(())
    }

    /// Command every track to neutral
    ///
    /// Safe to call repeatedly; each call re-sends the zero command.
    pub fn stop(&self) -> Result<()> {
        let mut drive = self.drive.lock();
        self.stop_locked(&mut drive)
    }

    fn stop_locked(&self, drive: &mut Drive) -> Result<()> {
        // Try every side even if one write fails
        let mut first_error = None;
        for side in MotorSide::ALL {
            let sent = self
                .neutral_speed(side)
                .and_then(|speed| drive.send(side, speed));
            if let Err(e) = sent {
                warn!("Failed to stop {:?} track: {}", side, e);
                first_error.get_or_insert(e);
            }
        }

        drive.poll_telemetry();

        match first_error {
            Some(e) => Err(e),
            None => {
                drive.state.throttle = [0.0; 2];
                drive.state.is_stopped = true;
                Ok(())
            }
        }
    }

    /// Stop the tracks if the last command is older than `deadline` at `now`
    ///
    /// Check and stop happen under one lock, so a command arriving
    /// concurrently is never overridden by a stale decision.
    pub fn stop_if_stale(&self, deadline: Duration, now: Instant) -> Result<StaleCheck> {
        let mut drive = self.drive.lock();
        let elapsed = now.saturating_duration_since(drive.state.last_command_time);

        if elapsed <= deadline {
            return Ok(StaleCheck::Fresh);
        }
        if drive.state.is_stopped {
            return Ok(StaleCheck::Idle);
        }

        self.stop_locked(&mut drive)?;
        Ok(StaleCheck::Tripped { elapsed })
    }

    /// Drain pending feedback and return the latest battery voltage
    pub fn refresh_telemetry(&self) -> f64 {
        let mut drive = self.drive.lock();
        drive.poll_telemetry();
        drive.state.battery_voltage
    }

    /// Last known battery voltage in volts
    pub fn voltage(&self) -> f64 {
        self.drive.lock().state.battery_voltage
    }

    pub fn is_stopped(&self) -> bool {
        self.drive.lock().state.is_stopped
    }

    pub fn last_command_time(&self) -> Instant {
        self.drive.lock().state.last_command_time
    }

    pub fn state(&self) -> MotorState {
        self.drive.lock().state
    }

    pub fn is_link_open(&self) -> bool {
        self.drive.lock().link.is_open()
    }

    /// Stop, let the zero command settle, then release the serial link
    ///
    /// Only the first call does anything. Lock waits are bounded so a stuck
    /// holder cannot hang shutdown.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down motor controller");

        match self.drive.try_lock_for(CLEANUP_LOCK_TIMEOUT) {
            Some(mut drive) => {
                if let Err(e) = self.stop_locked(&mut drive) {
                    warn!("Failed to stop motors during cleanup: {}", e);
                }
            }
            None => warn!("Motor link busy, skipping final stop command"),
        }

        if !self.settle.is_zero() {
            sleep(self.settle);
        }

        match self.drive.try_lock_for(CLEANUP_LOCK_TIMEOUT) {
            Some(mut drive) => {
                drive.link.close();
            }
            None => warn!("Motor link busy, leaving it to be closed on drop"),
        }
    }
}

impl Drop for MotorController {
    fn drop(&mut self) {
        // Make sure the motors are left at neutral
        self.cleanup();
    }
}
