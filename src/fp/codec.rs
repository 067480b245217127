//! Frame building and validation.
//!
//! Command and response headers are 8 bytes:
//! `F5 | opcode | p1 | p2 | p3 | reserved | chk | F5`, where `chk` is the XOR
//! of bytes 1..=5. Bodies and extended payloads are `F5 | data.. | chk | F5`
//! with `chk` the XOR of `data` (the start marker is not covered).

use super::error::{FpError, Result};
use super::types::{BODY_OVERHEAD, FRAME_SIZE, MARKER};

/// XOR of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Outbound command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub param_high: u8,
    pub param_low: u8,
    /// Privilege on enroll, set/query selector on configuration commands.
    pub mode: u8,
    pub reserved: u8,
}

impl Frame {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            param_high: 0,
            param_low: 0,
            mode: 0,
            reserved: 0,
        }
    }

    pub fn params(mut self, high: u8, low: u8) -> Self {
        self.param_high = high;
        self.param_low = low;
        self
    }

    /// Store a 16-bit value big-endian in the two parameter bytes.
    pub fn value(self, value: u16) -> Self {
        let [high, low] = value.to_be_bytes();
        self.params(high, low)
    }

    pub fn mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        encode(self.opcode, self.param_high, self.param_low, self.mode, self.reserved)
    }
}

/// Encode an 8-byte command frame.
pub fn encode(opcode: u8, param_high: u8, param_low: u8, mode: u8, reserved: u8) -> [u8; FRAME_SIZE] {
    let mut frame = [MARKER, opcode, param_high, param_low, mode, reserved, 0, MARKER];
    frame[6] = checksum(&frame[1..6]);
    frame
}

/// Validated response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub field_a: u8,
    pub field_b: u8,
    pub status: u8,
    pub reserved: u8,
}

impl Header {
    /// The two fields read as a big-endian u16 (count, length or user id).
    pub fn value(&self) -> u16 {
        u16::from_be_bytes([self.field_a, self.field_b])
    }
}

/// Decode and validate an 8-byte response header.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() != FRAME_SIZE {
        return Err(FpError::framing(format!(
            "Header must be {FRAME_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[0] != MARKER || bytes[7] != MARKER {
        return Err(FpError::framing(format!("Bad header markers: {bytes:02X?}")));
    }
    let expected = checksum(&bytes[1..6]);
    if bytes[6] != expected {
        return Err(FpError::framing(format!(
            "Header checksum mismatch: got {:#04x}, expected {expected:#04x}",
            bytes[6]
        )));
    }

    Ok(Header {
        opcode: bytes[1],
        field_a: bytes[2],
        field_b: bytes[3],
        status: bytes[4],
        reserved: bytes[5],
    })
}

/// Validate a body packet and return the `declared_len` bytes it carries.
pub fn decode_body(bytes: &[u8], declared_len: usize) -> Result<&[u8]> {
    let expected_len = declared_len + BODY_OVERHEAD;
    if bytes.len() != expected_len {
        return Err(FpError::framing(format!(
            "Body length {} does not match declared {declared_len} + {BODY_OVERHEAD}",
            bytes.len()
        )));
    }
    if bytes[0] != MARKER {
        return Err(FpError::framing(format!("Bad body start byte {:#04x}", bytes[0])));
    }
    if bytes[expected_len - 1] != MARKER {
        return Err(FpError::framing(format!(
            "Bad body tail byte {:#04x}",
            bytes[expected_len - 1]
        )));
    }

    let data = &bytes[1..expected_len - 2];
    let expected = checksum(data);
    let actual = bytes[expected_len - 2];
    if actual != expected {
        return Err(FpError::framing(format!(
            "Body checksum mismatch: got {actual:#04x}, expected {expected:#04x}"
        )));
    }

    Ok(data)
}

/// Wrap data into an extended payload packet.
pub fn encode_packet(data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(data.len() + BODY_OVERHEAD);
    packet.push(MARKER);
    packet.extend_from_slice(data);
    packet.push(checksum(data));
    packet.push(MARKER);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_delete_all() {
        let frame = encode(0x05, 0, 0, 0, 0);
        assert_eq!(frame, [0xF5, 0x05, 0x00, 0x00, 0x00, 0x00, 0x05, 0xF5]);
    }

    #[test]
    fn test_checksum_covers_interior_bytes() {
        let frame = Frame::new(0x01).params(0x12, 0x34).mode(3).encode();
        assert_eq!(frame[6], 0x01 ^ 0x12 ^ 0x34 ^ 0x03);
        assert_eq!(frame[6], checksum(&frame[1..6]));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let frame = Frame::new(0x2E).value(0x01FF).mode(1);
        let header = decode_header(&frame.encode()).unwrap();
        assert_eq!(header.opcode, 0x2E);
        assert_eq!(header.field_a, 0x01);
        assert_eq!(header.field_b, 0xFF);
        assert_eq!(header.status, 1);
        assert_eq!(header.value(), 0x01FF);
    }

    #[test]
    fn test_decode_rejects_corrupt_checksum() {
        let mut frame = encode(0x09, 0x00, 0x02, 0x00, 0x00);
        frame[6] ^= 0x40;
        assert!(matches!(decode_header(&frame), Err(FpError::Framing(_))));
    }

    #[test]
    fn test_decode_rejects_every_single_corruption() {
        let good = encode(0x0C, 0x00, 0x2A, 0x02, 0x00);
        for pos in 0..FRAME_SIZE {
            let mut bad = good;
            bad[pos] ^= 0x01;
            assert!(
                matches!(decode_header(&bad), Err(FpError::Framing(_))),
                "corruption at byte {pos} not detected"
            );
        }
    }

    #[test]
    fn test_decode_rejects_bad_markers_and_length() {
        let mut frame = encode(0x05, 0, 0, 0, 0);
        frame[7] = 0x00;
        assert!(decode_header(&frame).is_err());
        assert!(decode_header(&[0xF5, 0x05, 0xF5]).is_err());
    }

    #[test]
    fn test_body_round_trip() {
        let packet = encode_packet(b"V1.2");
        assert_eq!(packet.len(), 4 + BODY_OVERHEAD);
        assert_eq!(decode_body(&packet, 4).unwrap(), b"V1.2");
    }

    #[test]
    fn test_body_checksum_excludes_start_marker() {
        let packet = encode_packet(&[0x01, 0x02, 0x04]);
        assert_eq!(packet, vec![0xF5, 0x01, 0x02, 0x04, 0x07, 0xF5]);
    }

    #[test]
    fn test_body_rejects_length_mismatch() {
        let packet = encode_packet(&[1, 2, 3]);
        assert!(matches!(decode_body(&packet, 4), Err(FpError::Framing(_))));
    }

    #[test]
    fn test_body_rejects_corruption() {
        let mut packet = encode_packet(&[9, 8, 7, 6]);
        packet[2] ^= 0xFF;
        assert!(matches!(decode_body(&packet, 4), Err(FpError::Framing(_))));

        let mut packet = encode_packet(&[9, 8, 7, 6]);
        packet[0] = 0x00;
        assert!(matches!(decode_body(&packet, 4), Err(FpError::Framing(_))));
    }
}
