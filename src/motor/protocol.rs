// Hoverboard serial command protocol
//
// Command packet format (7 bytes):
// [0x2F, SlaveId, Speed_lo, Speed_hi, State, Crc_lo, Crc_hi]
//
// The CRC covers the first 5 bytes. Commands are send-and-forget, the board
// never acknowledges them.

/// Start byte of every command packet (`/` in ASCII)
pub const COMMAND_START: u8 = 0x2F;

/// Total length of an encoded command packet
pub const COMMAND_LEN: usize = 7;

/// Bytes covered by the CRC
const PAYLOAD_LEN: usize = 5;

/// Largest speed magnitude the controller board accepts
pub const SPEED_LIMIT: i16 = 1000;

/// State flags sent with every drive command
pub const DRIVE_STATE: u8 = 0x20;

/// Slave IDs the controller board answers to
pub const KNOWN_SLAVES: [u8; 2] = [0, 1];

const CRC_POLY: u16 = 0x1021;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid slave id {0}")]
    InvalidSlaveId(u8),
}

/// An encoded command, ready for the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket([u8; COMMAND_LEN]);

impl CommandPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn slave_id(&self) -> u8 {
        self.0[1]
    }

    /// Speed as it was put on the wire (after saturation)
    pub fn speed(&self) -> i16 {
        i16::from_le_bytes([self.0[2], self.0[3]])
    }

    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.0[5], self.0[6]])
    }
}

impl AsRef<[u8]> for CommandPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// CRC-16 (poly 0x1021, init 0, MSB first, no final xor)
pub fn compute_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build a command packet for one slave
///
/// `speed` is saturated to ±[`SPEED_LIMIT`].
pub fn encode_command(slave_id: u8, speed: i16, state: u8) -> Result<CommandPacket, ProtocolError> {
    if !KNOWN_SLAVES.contains(&slave_id) {
        return Err(ProtocolError::InvalidSlaveId(slave_id));
    }

    let [speed_lo, speed_hi] = speed.clamp(-SPEED_LIMIT, SPEED_LIMIT).to_le_bytes();

    let mut packet = [0u8; COMMAND_LEN];
    packet[..PAYLOAD_LEN].copy_from_slice(&[COMMAND_START, slave_id, speed_lo, speed_hi, state]);

    let [crc_lo, crc_hi] = compute_crc(&packet[..PAYLOAD_LEN]).to_le_bytes();
    packet[5] = crc_lo;
    packet[6] = crc_hi;

    Ok(CommandPacket(packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        // Standard check input for this CRC-16 flavour
        assert_eq!(compute_crc(b"123456789"), 0x31C3);
        assert_eq!(compute_crc(&[]), 0);
    }

    #[test]
    fn test_crc_deterministic() {
        let data = [0x2F, 0x01, 0x0C, 0xFE, 0x20];
        assert_eq!(compute_crc(&data), compute_crc(&data));
        assert_eq!(compute_crc(&data), 0x7A34);
    }

    #[test]
    fn test_crc_detects_single_bit_flips() {
        let packets = [
            [0x2F, 0x00, 0xF4, 0x01, 0x20],
            [0x2F, 0x01, 0x00, 0x00, 0x20],
            [0x2F, 0x00, 0x18, 0xFC, 0x20],
            [0x2F, 0x01, 0xE8, 0x03, 0x00],
        ];

        for packet in packets {
            let reference = compute_crc(&packet);
            for byte in 0..packet.len() {
                for bit in 0..8 {
                    let mut mutated = packet;
                    mutated[byte] ^= 1 << bit;
                    assert_ne!(
                        compute_crc(&mutated),
                        reference,
                        "flip of bit {} in byte {} of {:02X?} went unnoticed",
                        bit,
                        byte,
                        packet
                    );
                }
            }
        }
    }

    #[test]
    fn test_encode_forward_command() {
        let packet = encode_command(0, 500, 32).unwrap();
        let bytes = packet.as_bytes();

        assert_eq!(bytes.len(), COMMAND_LEN);
        assert_eq!(&bytes[..5], &[0x2F, 0x00, 0xF4, 0x01, 0x20]);
        assert_eq!(packet.crc(), compute_crc(&bytes[..5]));
        assert_eq!(&bytes[5..], &[0x8C, 0x45]); // 0x458C little-endian
    }

    #[test]
    fn test_encode_reverse_command() {
        let packet = encode_command(1, -500, DRIVE_STATE).unwrap();
        assert_eq!(packet.slave_id(), 1);
        assert_eq!(packet.speed(), -500);
        assert_eq!(&packet.as_bytes()[2..4], &[0x0C, 0xFE]);
        assert_eq!(packet.crc(), 0x7A34);
    }

    #[test]
    fn test_encode_saturates_speed() {
        assert_eq!(encode_command(0, 5000, DRIVE_STATE).unwrap().speed(), SPEED_LIMIT);
        assert_eq!(encode_command(0, i16::MIN, DRIVE_STATE).unwrap().speed(), -SPEED_LIMIT);
    }

    #[test]
    fn test_encode_rejects_unknown_slave() {
        assert_eq!(
            encode_command(2, 0, DRIVE_STATE),
            Err(ProtocolError::InvalidSlaveId(2))
        );
        assert!(encode_command(0xFF, 100, DRIVE_STATE).is_err());
    }
}
