use anyhow::{anyhow, Result};
use bytes::{BufMut, Bytes, BytesMut};

use super::{
    crc::{crc16, crc16_update, has_valid_crc, CRC16_INIT},
    pdu::ReadRequest,
};

/// `[unit, function, startHi, startLo, qtyHi, qtyLo, crcLo, crcHi]`
pub const RTU_READ_REQUEST_LEN: usize = 8;

/// Largest RTU application data unit; older bytes are discarded beyond it.
pub const MAX_RTU_ADU_LEN: usize = 256;

/// Decode a complete read request frame into its unit id and request.
pub fn parse_rtu_request(frame: &[u8]) -> Result<(u8, ReadRequest)> {
    if frame.len() != RTU_READ_REQUEST_LEN {
        return Err(anyhow!(
            "Unexpected RTU frame length {} (read requests are {RTU_READ_REQUEST_LEN} bytes)",
            frame.len()
        ));
    }
    if !has_valid_crc(frame) {
        return Err(anyhow!("RTU frame CRC mismatch"));
    }
    let request = ReadRequest::parse(&frame[1..RTU_READ_REQUEST_LEN - 2])?;
    Ok((frame[0], request))
}

/// Prefix `pdu` with the unit id and append the CRC16 trailer (low byte first).
pub fn build_rtu_response(unit_id: u8, pdu: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(pdu.len() + 3);
    frame.put_u8(unit_id);
    frame.put_slice(pdu);
    let crc = crc16(&frame);
    frame.put_u16_le(crc);
    frame.freeze()
}

/// Build a CRC-terminated read request frame, as a master would send it.
pub fn build_rtu_request(unit_id: u8, request: &ReadRequest) -> Bytes {
    build_rtu_response(unit_id, &request.to_bytes())
}

/// Incremental, resynchronizing RTU framer.
///
/// Bytes are pushed one at a time. After each push two windows ending at the
/// newest byte are checked, each costing constant work:
///
/// - the whole buffer, whose CRC16 is kept as a running accumulator, so a
///   frame of any length that starts at the buffer head is recognized;
/// - the last [`RTU_READ_REQUEST_LEN`] bytes, so a read request behind line
///   noise or a partial frame is found as soon as its last byte arrives.
///
/// The head window wins when both match. Bytes in front of the accepted
/// window are discarded. Once the buffer overflows [`MAX_RTU_ADU_LEN`] the
/// head is noise and only the tail window is checked until the next frame.
#[derive(Debug)]
pub struct RtuFramer {
    buffer: Vec<u8>,
    /// CRC16 of `buffer[..len - 2]`, `None` after the head was dropped.
    head_crc: Option<u16>,
}

impl Default for RtuFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl RtuFramer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_RTU_ADU_LEN),
            head_crc: Some(CRC16_INIT),
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.buffer.len() == MAX_RTU_ADU_LEN {
            self.buffer.remove(0);
            self.head_crc = None;
        }
        self.buffer.push(byte);

        let end = self.buffer.len();
        if end >= 3 {
            let folded = self.buffer[end - 3];
            if let Some(crc) = self.head_crc.as_mut() {
                *crc = crc16_update(*crc, folded);
            }
        }
        if end < RTU_READ_REQUEST_LEN {
            return None;
        }

        let trailer = u16::from_le_bytes([self.buffer[end - 2], self.buffer[end - 1]]);
        let tail = end - RTU_READ_REQUEST_LEN;
        let start = if self.head_crc == Some(trailer) {
            0
        } else if has_valid_crc(&self.buffer[tail..]) {
            tail
        } else {
            return None;
        };

        if start > 0 {
            log::debug!("Skipped {start} byte(s) before RTU frame");
        }
        let frame = self.buffer[start..].to_vec();
        self.buffer.clear();
        self.head_crc = Some(CRC16_INIT);
        Some(frame)
    }

    /// Push a chunk of bytes, returning every frame completed along the way.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Bytes buffered while waiting for a frame to complete.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::register::FunctionCode;

    const READ_HOLDINGS: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

    #[test]
    fn parse_valid_request() {
        let (unit, request) = parse_rtu_request(&READ_HOLDINGS).unwrap();
        assert_eq!(unit, 1);
        assert_eq!(request.function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(request.start, 0);
        assert_eq!(request.quantity, 2);
    }

    #[test]
    fn parse_rejects_bad_frames() {
        let mut corrupted = READ_HOLDINGS;
        corrupted[5] = 0x03;
        assert!(parse_rtu_request(&corrupted).is_err());
        assert!(parse_rtu_request(&READ_HOLDINGS[..7]).is_err());

        // Valid CRC, unsupported function (write single register).
        let write = build_rtu_response(1, &[0x06, 0x00, 0x01, 0x00, 0x03]);
        assert!(parse_rtu_request(&write).is_err());
    }

    #[test]
    fn request_builder_matches_known_frame() {
        let request = ReadRequest::new(FunctionCode::ReadHoldingRegisters, 0, 2).unwrap();
        assert_eq!(build_rtu_request(1, &request).to_vec(), READ_HOLDINGS.to_vec());
    }

    #[test]
    fn response_has_little_endian_crc() {
        let frame = build_rtu_response(1, &[0x03, 0x02, 0x00, 0x64]);
        assert_eq!(frame.len(), 7);
        assert_eq!(&frame[..5], &[0x01, 0x03, 0x02, 0x00, 0x64][..]);
        assert!(has_valid_crc(&frame));
        let crc = crc16(&frame[..5]);
        assert_eq!(frame[5], (crc & 0xFF) as u8);
        assert_eq!(frame[6], (crc >> 8) as u8);
    }

    #[test]
    fn framer_waits_for_complete_frame() {
        let mut framer = RtuFramer::new();
        for &b in &READ_HOLDINGS[..7] {
            assert!(framer.push(b).is_none());
        }
        assert_eq!(framer.pending().len(), 7);
        assert_eq!(framer.push(READ_HOLDINGS[7]).unwrap(), READ_HOLDINGS.to_vec());
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn framer_skips_garbage_prefix() {
        let mut framer = RtuFramer::new();
        let mut stream = vec![0xAA, 0x55, 0x13];
        stream.extend_from_slice(&READ_HOLDINGS);

        let (head, tail) = stream.split_at(10);
        assert!(framer.extend(head).is_empty());
        let frames = framer.extend(tail);
        assert_eq!(frames, vec![READ_HOLDINGS.to_vec()]);
    }

    #[test]
    fn framer_handles_back_to_back_frames() {
        let second = build_rtu_request(
            7,
            &ReadRequest::new(FunctionCode::ReadCoils, 0x20, 10).unwrap(),
        );
        let mut stream = READ_HOLDINGS.to_vec();
        stream.extend_from_slice(&second);

        let frames = RtuFramer::new().extend(&stream);
        assert_eq!(frames, vec![READ_HOLDINGS.to_vec(), second.to_vec()]);
    }

    #[test]
    fn framer_recovers_after_corrupted_frame() {
        let mut corrupted = READ_HOLDINGS;
        corrupted[3] ^= 0xFF;
        let mut stream = corrupted.to_vec();
        stream.extend_from_slice(&READ_HOLDINGS);

        let frames = RtuFramer::new().extend(&stream);
        assert_eq!(frames, vec![READ_HOLDINGS.to_vec()]);
    }

    #[test]
    fn framer_buffer_is_bounded() {
        let mut framer = RtuFramer::new();
        for i in 0..1000u32 {
            // Alternating 00/FF bytes never form a valid CRC window.
            let _ = framer.push((i % 2) as u8 * 0xFF);
        }
        assert!(framer.pending().len() <= MAX_RTU_ADU_LEN);
    }

    #[test]
    fn framer_finds_request_after_overflowing_noise() {
        let mut framer = RtuFramer::new();
        for i in 0..300u32 {
            assert!(framer.push((i % 2) as u8 * 0xFF).is_none());
        }
        assert_eq!(framer.extend(&READ_HOLDINGS), vec![READ_HOLDINGS.to_vec()]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn framer_recognizes_longer_frame_at_head() {
        // Write multiple registers (0x10) to another unit's map: 13 bytes.
        let write = build_rtu_response(
            1,
            &[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02],
        );
        let mut stream = write.to_vec();
        stream.extend_from_slice(&READ_HOLDINGS);

        let frames = RtuFramer::new().extend(&stream);
        assert_eq!(frames, vec![write.to_vec(), READ_HOLDINGS.to_vec()]);
    }
}
