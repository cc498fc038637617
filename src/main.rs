use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tank_drive_runtime::config::{ConfigError, DriveConfig};

/// Drive runtime for the tracked base
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON config file (defaults are used for anything it leaves out)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port of the motor controller board
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Watchdog deadline in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Watchdog poll interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Speed magnitude at full throttle (both tracks)
    #[arg(long)]
    max_speed: Option<i16>,
}

impl Args {
    fn into_config(self) -> Result<DriveConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => DriveConfig::load(path)?,
            None => DriveConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(baud) = self.baud {
            config.baudrate = baud;
        }
        if let Some(deadline_ms) = self.deadline_ms {
            config.deadline_ms = deadline_ms;
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_ms = poll_ms;
        }
        if let Some(max_speed) = self.max_speed {
            config.set_max_speed(max_speed);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init(); // installs the subscriber globally

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = tank_drive_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
