// In-memory serial port for tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::link::Port;
use super::protocol::COMMAND_LEN;

#[derive(Debug, Default)]
struct Shared {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    fail_writes: bool,
    write_delay: Duration,
}

/// Port half, handed to the code under test
pub struct MockPort {
    shared: Arc<Mutex<Shared>>,
}

/// Test half, used to inspect and drive the port
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockPort {
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockHandle { shared },
        )
    }
}

impl Port for MockPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let delay = self.shared.lock().write_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut shared = self.shared.lock();
        if shared.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        shared.tx.extend_from_slice(data);
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.shared.lock().rx.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock();
        let n = buf.len().min(shared.rx.len());
        for (slot, byte) in buf.iter_mut().zip(shared.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl MockHandle {
    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.shared.lock().tx.clone()
    }

    /// Written bytes split into command packets
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .tx
            .chunks(COMMAND_LEN)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    pub fn clear_written(&self) {
        self.shared.lock().tx.clear();
    }

    /// Queue bytes for the code under test to read
    pub fn push_rx(&self, data: &[u8]) {
        self.shared.lock().rx.extend(data.iter().copied());
    }

    pub fn fail_writes(&self, fail: bool) {
        self.shared.lock().fail_writes = fail;
    }

    /// Make every write block the calling thread, like a slow UART
    pub fn delay_writes(&self, delay: Duration) {
        self.shared.lock().write_delay = delay;
    }
}
