// Drive runtime: command plane <-> motor controller, with the safety watchdog
// running alongside.
// Note: the watchdog is what stops the vehicle if teleop crashes or the
// network drops; this loop only forwards commands and publishes status.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

// local imports
use crate::config::{DriveConfig, LOOP_HZ, TOPIC_CMD_MOTOR, TOPIC_CMD_STOP, TOPIC_DRIVE_STATE};
use crate::messages::{DriveStatus, MotorCommand, RuntimeHealth, StopCommand};
use crate::motor::{DriveError, MotorController, MotorSide};
use crate::watchdog::{Watchdog, WatchdogState};

pub struct Runtime {
    controller: Arc<MotorController>,
    link_ok: bool,
}

impl Runtime {
    pub fn new(controller: Arc<MotorController>) -> Self {
        Self {
            controller,
            link_ok: true,
        }
    }

    fn record(&mut self, result: Result<(), DriveError>) {
        match result {
            Ok(()) => {
                if !self.link_ok {
                    info!("Motor link recovered");
                }
                self.link_ok = true;
            }
            Err(DriveError::Link(e)) => {
                if self.link_ok {
                    error!("Motor link failure: {}", e);
                }
                self.link_ok = false;
            }
            Err(e) => warn!("Rejected motor command: {}", e),
        }
    }

    /// Forward a throttle command to both tracks
    pub fn on_command(&mut self, cmd: MotorCommand) {
        debug!("Received command: {:?}", &cmd);
        let result = self
            .controller
            .set_esc(MotorSide::Left, cmd.left)
            .and_then(|()| self.controller.set_esc(MotorSide::Right, cmd.right));
        self.record(result);
    }

    pub fn on_stop(&mut self) {
        info!("Stop requested");
        let result = self.controller.stop();
        self.record(result);
    }

    /// Status snapshot for the command plane
    pub fn status(&self, watchdog: WatchdogState) -> DriveStatus {
        let state = self.controller.state();
        let health = if self.link_ok {
            RuntimeHealth::from(watchdog)
        } else {
            RuntimeHealth::LinkDown
        };

        DriveStatus {
            voltage: state.battery_voltage,
            stopped: state.is_stopped,
            health,
        }
    }
}

pub async fn run(config: DriveConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let controller = Arc::new(MotorController::open(&config)?);
    let watchdog = Watchdog::from_config(Arc::clone(&controller), &config).spawn();

    let result = serve(Arc::clone(&controller), watchdog.subscribe()).await;

    // Watchdog first, so it cannot race the final stop
    watchdog.shutdown().await;
    let cleanup = tokio::task::spawn_blocking(move || controller.cleanup());
    if let Err(e) = cleanup.await {
        error!("Motor cleanup failed: {}", e);
    }

    result
}

async fn serve(
    controller: Arc<MotorController>,
    watchdog: tokio::sync::watch::Receiver<WatchdogState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_motor = session.declare_subscriber(TOPIC_CMD_MOTOR).await?;
    let sub_stop = session.declare_subscriber(TOPIC_CMD_STOP).await?;
    let pub_state = session.declare_publisher(TOPIC_DRIVE_STATE).await?;

    let mut runtime = Runtime::new(controller);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}, {}", TOPIC_CMD_MOTOR, TOPIC_CMD_STOP);
    info!("Publishing to: {}", TOPIC_DRIVE_STATE);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            signal = &mut ctrl_c => {
                signal?;
                info!("Interrupted, shutting down");
                return Ok(());
            }
        }

        // 1. Stop requests win over any throttle received in the same tick
        let mut stop_requested = false;
        while let Ok(Some(sample)) = sub_stop.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Err(e) = serde_json::from_slice::<StopCommand>(&payload) {
                // Any sample on the stop topic stops the tracks
                warn!("Malformed stop request: {}", e);
            }
            stop_requested = true;
        }

        // 2. Drain all pending commands (non-blocking), keep latest
        let mut latest = None;
        while let Ok(Some(sample)) = sub_motor.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotorCommand>(&payload) {
                Ok(cmd) => latest = Some(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        if stop_requested {
            runtime.on_stop();
        } else if let Some(cmd) = latest {
            runtime.on_command(cmd);
        }

        // 3. Publish status
        let status = runtime.status(*watchdog.borrow());
        let status_json = serde_json::to_string(&status)?;
        pub_state.put(status_json).await?;
    }
}
