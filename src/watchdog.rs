// Safety watchdog
// Forces both tracks to neutral when commands stop arriving. Without it, a
// crashed or disconnected command plane would leave the vehicle running on
// its last command.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::DriveConfig;
use crate::motor::{MotorController, StaleCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    /// Commands are fresh (or the motors are idle)
    Armed,
    /// A forced stop was issued; cleared by the next fresh command
    Tripped,
}

pub struct Watchdog {
    controller: Arc<MotorController>,
    deadline: Duration,
    poll_interval: Duration,
    state: WatchdogState,
    link_failed: bool,
}

impl Watchdog {
    pub fn new(controller: Arc<MotorController>, deadline: Duration, poll_interval: Duration) -> Self {
        Self {
            controller,
            deadline,
            poll_interval,
            state: WatchdogState::Armed,
            link_failed: false,
        }
    }

    pub fn from_config(controller: Arc<MotorController>, config: &DriveConfig) -> Self {
        Self::new(controller, config.deadline(), config.poll_interval())
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn tick(&mut self) -> WatchdogState {
        self.tick_at(Instant::now())
    }

    /// Run one freshness check as if the current time were `now`
    pub fn tick_at(&mut self, now: Instant) -> WatchdogState {
        match self.controller.stop_if_stale(self.deadline, now) {
            Ok(StaleCheck::Fresh) => {
                if self.state == WatchdogState::Tripped {
                    info!("Fresh command received, watchdog re-armed");
                }
                self.state = WatchdogState::Armed;
                self.link_failed = false;
            }
            Ok(StaleCheck::Idle) => {
                self.link_failed = false;
            }
            Ok(StaleCheck::Tripped { elapsed }) => {
                warn!(
                    "Command stale ({} ms old, deadline {} ms), motors stopped",
                    elapsed.as_millis(),
                    self.deadline.as_millis()
                );
                self.state = WatchdogState::Tripped;
                self.link_failed = false;
            }
            Err(e) => {
                // Retried on the next tick
                if self.link_failed {
                    debug!("Forced stop still failing: {}", e);
                } else {
                    error!("Watchdog failed to stop motors: {}", e);
                }
                self.link_failed = true;
            }
        }

        // Keep the voltage reading current while no commands are flowing
        self.controller.refresh_telemetry();
        self.state
    }

    /// Run the watchdog as a tokio task until its handle is shut down
    ///
    /// Each check runs on the blocking pool, since it takes the controller
    /// lock and writes to the serial port.
    pub fn spawn(self) -> WatchdogHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(self.state);

        let task = tokio::spawn(async move {
            info!(
                "Watchdog started: {} ms deadline, {} ms poll",
                self.deadline.as_millis(),
                self.poll_interval.as_millis()
            );

            let mut tick = interval(self.poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut watchdog = self;

            while !*shutdown_rx.borrow() {
                tokio::select! {
                    _ = tick.tick() => {}
                    // Also fires if the handle was dropped
                    _ = shutdown_rx.changed() => break,
                }

                let check = tokio::task::spawn_blocking(move || {
                    let state = watchdog.tick();
                    (watchdog, state)
                });
                let state = match check.await {
                    Ok((returned, state)) => {
                        watchdog = returned;
                        state
                    }
                    Err(e) => {
                        error!("Watchdog check panicked: {}", e);
                        break;
                    }
                };

                state_tx.send_if_modified(|current| {
                    let changed = *current != state;
                    *current = state;
                    changed
                });
            }

            info!("Watchdog stopped");
        });

        WatchdogHandle {
            shutdown: shutdown_tx,
            state: state_rx,
            task,
        }
    }
}

/// Control handle for a spawned watchdog
pub struct WatchdogHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WatchdogState>,
    task: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn state(&self) -> WatchdogState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchdogState> {
        self.state.clone()
    }

    /// Signal the task to stop and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Watchdog task ended abnormally: {}", e);
        }
    }
}
