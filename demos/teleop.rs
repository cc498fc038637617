// Keyboard teleop: W/S drive, A/D pivot, R/F speed, Space stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use tank_drive_runtime::config::{TOPIC_CMD_MOTOR, TOPIC_CMD_STOP};
use tank_drive_runtime::messages::{MotorCommand, StopCommand};

const THROTTLES: [f64; 3] = [0.15, 0.35, 0.7];
const INPUT_TIMEOUT_MS: u64 = 150; // Zero the tracks after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_motor = session.declare_publisher(TOPIC_CMD_MOTOR).await?;
    let pub_stop = session.declare_publisher(TOPIC_CMD_STOP).await?;

    info!("Controls: W/S=drive, A/D=pivot, R/F=speed, Space=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_motor, &pub_stop).await;
    disable_raw_mode()?;

    // Leave the tracks stopped whatever happened above
    pub_stop.put(serde_json::to_string(&StopCommand::default())?).await?;
    result
}

async fn run_teleop(
    pub_motor: &zenoh::pubsub::Publisher<'_>,
    pub_stop: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut cmd = MotorCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 50ms timeout (20Hz effective rate)
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let throttle = THROTTLES[speed_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        cmd = MotorCommand::new(throttle, throttle);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd = MotorCommand::new(-throttle, -throttle);
                        last_movement_input = Instant::now();
                    }

                    // Pivot in place: tracks in opposite directions
                    KeyCode::Char('a') if pressed => {
                        cmd = MotorCommand::new(-throttle, throttle);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd = MotorCommand::new(throttle, -throttle);
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char(' ') if pressed => {
                        cmd = MotorCommand::default();
                        pub_stop.put(serde_json::to_string(&StopCommand::default())?).await?;
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(THROTTLES.len() - 1);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = MotorCommand::default();
        }

        // Always publish at ~20Hz
        pub_motor.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
