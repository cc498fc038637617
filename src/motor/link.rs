// Serial link to the hoverboard controller board
//
// Half-duplex, 8N1. Commands go out as whole packets; feedback bytes are
// drained opportunistically without blocking.

use serialport::{self, ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

/// Default serial configuration for the controller board firmware
pub const DEFAULT_BAUDRATE: u32 = 4800;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial link is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Byte-level access to the physical port
pub trait Port: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Number of received bytes waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Port for Box<dyn SerialPort> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        // No flush: draining the UART blocks for the whole transmit time
        Write::write_all(self, data)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }
}

/// Serial link - owns the port until closed
pub struct SerialLink {
    name: String,
    port: Option<Box<dyn Port>>,
}

impl SerialLink {
    /// Open a new connection to the controller board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening serial link on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        // Discard anything left over from before we owned the port
        port.clear(ClearBuffer::All)?;

        Ok(Self::from_port(port_name, Box::new(port)))
    }

    /// Wrap an already opened port
    pub fn from_port(name: &str, port: Box<dyn Port>) -> Self {
        Self {
            name: name.to_string(),
            port: Some(port),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&mut self) -> Result<&mut Box<dyn Port>> {
        self.port.as_mut().ok_or(LinkError::Closed)
    }

    /// Write one complete packet
    pub fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port()?.write_all(packet)?;
        debug!("Sent {:02X?}", packet);
        Ok(())
    }

    /// Drain whatever bytes are currently buffered (may be empty)
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        let port = self.port()?;
        let available = port.bytes_available()?;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut data = vec![0u8; available];
        let read = port.read(&mut data)?;
        data.truncate(read);
        Ok(data)
    }

    /// Release the port; later writes fail with [`LinkError::Closed`]
    pub fn close(&mut self) -> bool {
        let was_open = self.port.take().is_some();
        if was_open {
            info!("Closed serial link {}", self.name);
        }
        was_open
    }
}
