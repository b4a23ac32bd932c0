use anyhow::{anyhow, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub const MBAP_HEADER_LEN: usize = 7;

/// Largest PDU a Modbus/TCP frame may carry.
pub const MAX_PDU_LEN: usize = 253;

/// Modbus Application Protocol header in front of every TCP PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Byte count of the unit id plus the PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(buf: [u8; MBAP_HEADER_LEN]) -> Self {
        Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        }
    }

    /// Number of PDU bytes that follow the header.
    pub fn pdu_len(&self) -> Result<usize> {
        let pdu_len = usize::from(self.length)
            .checked_sub(1)
            .filter(|len| (1..=MAX_PDU_LEN).contains(len))
            .ok_or_else(|| anyhow!("Invalid MBAP length field: {}", self.length))?;
        Ok(pdu_len)
    }

    /// Header for the answer to this request: same transaction and unit,
    /// protocol id 0, length covering `pdu_len` plus the unit id.
    pub fn response(&self, pdu_len: usize) -> Self {
        Self {
            transaction_id: self.transaction_id,
            protocol_id: 0,
            length: (pdu_len + 1) as u16,
            unit_id: self.unit_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; MBAP_HEADER_LEN] {
        let [t_hi, t_lo] = self.transaction_id.to_be_bytes();
        let [p_hi, p_lo] = self.protocol_id.to_be_bytes();
        let [l_hi, l_lo] = self.length.to_be_bytes();
        [t_hi, t_lo, p_hi, p_lo, l_hi, l_lo, self.unit_id]
    }
}

/// Frame a response PDU for the request carrying `request_header`.
pub fn build_tcp_response(request_header: &MbapHeader, pdu: &[u8]) -> Bytes {
    let header = request_header.response(pdu.len());
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.put_slice(&header.to_bytes());
    frame.put_slice(pdu);
    frame.freeze()
}
