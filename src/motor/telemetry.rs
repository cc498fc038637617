// Telemetry frames sent back by the controller board
//
// Frame format (at least 15 bytes):
// [0xCD, 0xAB, ..., Volt_lo (offset 5), Volt_hi (offset 6), ...]
//
// Frames arrive asynchronously and are not CRC-checked here: a lost frame
// only leaves the last voltage reading in place.

use tracing::debug;

/// Start marker of a telemetry frame (0xABCD little-endian)
pub const TELEMETRY_START: [u8; 2] = [0xCD, 0xAB];

/// Minimum number of bytes from the marker for a complete frame
pub const TELEMETRY_MIN_LEN: usize = 15;

/// Offset of the battery voltage (u16 LE, 0.01 V/unit) from the marker
const VOLTAGE_OFFSET: usize = 5;

/// Raw voltage units per volt
const UNITS_PER_VOLT: f64 = 100.0;

/// Position of the first telemetry marker in `buffer`
fn find_marker(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == TELEMETRY_START)
}

/// Position of the last telemetry marker in `buffer`
fn rfind_marker(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).rposition(|w| w == TELEMETRY_START)
}

/// Battery voltage from the first telemetry frame in `buffer`
///
/// Returns `None` if there is no marker, or if the first marker is not
/// followed by a full frame yet.
pub fn find_voltage(buffer: &[u8]) -> Option<f64> {
    let start = find_marker(buffer)?;
    let frame = &buffer[start..];
    if frame.len() < TELEMETRY_MIN_LEN {
        return None;
    }

    let raw = u16::from_le_bytes([frame[VOLTAGE_OFFSET], frame[VOLTAGE_OFFSET + 1]]);
    Some(raw as f64 / UNITS_PER_VOLT)
}

/// Recovers telemetry frames from a byte stream delivered in arbitrary chunks
#[derive(Debug, Default)]
pub struct TelemetryExtractor {
    pending: Vec<u8>,
}

impl TelemetryExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes and return the voltage of the first complete frame, if any
    ///
    /// Only a trailing partial frame is kept for the next read; complete
    /// frames after the first one are dropped so the reading never lags.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<f64> {
        self.pending.extend_from_slice(bytes);

        let (voltage, consumed) = match find_marker(&self.pending) {
            Some(start) if self.pending.len() - start >= TELEMETRY_MIN_LEN => (
                find_voltage(&self.pending[start..]),
                start + TELEMETRY_MIN_LEN,
            ),
            _ => (None, 0),
        };

        let rest = &self.pending[consumed..];
        let keep_from = match rfind_marker(rest) {
            Some(last) if rest.len() - last < TELEMETRY_MIN_LEN => consumed + last,
            // Keep a trailing 0xCD, it may be the first half of a marker
            _ if rest.last() == Some(&TELEMETRY_START[0]) => self.pending.len() - 1,
            _ => self.pending.len(),
        };

        if keep_from > consumed {
            debug!("Discarding {} telemetry bytes", keep_from - consumed);
        }
        self.pending.drain(..keep_from);

        voltage
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Telemetry frame carrying `raw` as the voltage field
    fn frame(raw: u16) -> Vec<u8> {
        let mut frame = vec![0u8; TELEMETRY_MIN_LEN];
        frame[..2].copy_from_slice(&TELEMETRY_START);
        frame[2] = 0x01;
        frame[3] = 0xAE;
        frame[4] = 0x11;
        frame[5..7].copy_from_slice(&raw.to_le_bytes());
        frame
    }

    #[test]
    fn test_voltage_after_noise() {
        let mut buffer = vec![0x00, 0x13, 0x2F, 0xAB, 0xCD, 0x42];
        buffer.extend(frame(2550));

        let voltage = find_voltage(&buffer).unwrap();
        assert!((voltage - 25.50).abs() < 1e-9);
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(find_voltage(&[0x2F, 0x00, 0xF4, 0x01, 0x20, 0x8C, 0x45]), None);
        assert_eq!(find_voltage(&[]), None);
    }

    #[test]
    fn test_insufficient_data() {
        let truncated = &frame(2550)[..TELEMETRY_MIN_LEN - 1];
        assert_eq!(find_voltage(truncated), None);
    }

    #[test]
    fn test_first_frame_wins() {
        let mut buffer = frame(3600);
        buffer.extend(frame(3500));
        let voltage = find_voltage(&buffer).unwrap();
        assert!((voltage - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_extractor_recovers_split_frame() {
        let mut extractor = TelemetryExtractor::new();
        let mut stream = vec![0x55, 0x66];
        stream.extend(frame(4012));

        assert_eq!(extractor.feed(&stream[..6]), None);
        assert_eq!(extractor.pending(), 4);

        let voltage = extractor.feed(&stream[6..]).unwrap();
        assert!((voltage - 40.12).abs() < 1e-9);
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn test_extractor_marker_split_across_reads() {
        let mut extractor = TelemetryExtractor::new();
        let stream = frame(2400);

        assert_eq!(extractor.feed(&[0x00, stream[0]]), None);
        assert_eq!(extractor.pending(), 1);

        let voltage = extractor.feed(&stream[1..]).unwrap();
        assert!((voltage - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_extractor_discards_noise() {
        let mut extractor = TelemetryExtractor::new();
        assert_eq!(extractor.feed(&[0x01; 100]), None);
        assert_eq!(extractor.pending(), 0);
        assert_eq!(extractor.feed(&[]), None);
    }

    #[test]
    fn test_extractor_reports_latest_drain() {
        let mut extractor = TelemetryExtractor::new();

        // Two new frames per poll: each poll reports the first frame it read
        for poll in 0..6u16 {
            let first = 2900 + poll * 20;
            let mut drain = frame(first);
            drain.extend(frame(first + 10));

            let voltage = extractor.feed(&drain).unwrap();
            assert!(
                (voltage - first as f64 / 100.0).abs() < 1e-9,
                "poll {} reported {} V",
                poll,
                voltage
            );
            assert_eq!(extractor.pending(), 0);
        }

        assert_eq!(extractor.feed(&[]), None);
    }

    #[test]
    fn test_extractor_keeps_trailing_partial_frame() {
        let mut extractor = TelemetryExtractor::new();
        let next = frame(2300);

        let mut drain = frame(2350);
        drain.extend(frame(2340));
        drain.extend(&next[..9]);

        let voltage = extractor.feed(&drain).unwrap();
        assert!((voltage - 23.5).abs() < 1e-9);
        assert_eq!(extractor.pending(), 9);

        let voltage = extractor.feed(&next[9..]).unwrap();
        assert!((voltage - 23.0).abs() < 1e-9);
        assert_eq!(extractor.pending(), 0);
    }
}
