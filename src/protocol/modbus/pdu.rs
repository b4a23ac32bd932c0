use anyhow::{anyhow, Result};
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

use crate::protocol::register::{values_in_range, FunctionCode, RegisterMap};

/// A decoded read request PDU: `{function, startAddress, quantity}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub function: FunctionCode,
    pub start: u16,
    pub quantity: u16,
}

impl ReadRequest {
    pub fn new(function: FunctionCode, start: u16, quantity: u16) -> Result<Self> {
        if quantity == 0 || quantity > function.max_quantity() {
            return Err(anyhow!(
                "Quantity {quantity} out of range for function {function} (1..={})",
                function.max_quantity()
            ));
        }
        if u32::from(start) + u32::from(quantity) > 0x1_0000 {
            return Err(anyhow!(
                "Request {start}+{quantity} runs past the end of the address space"
            ));
        }
        Ok(Self {
            function,
            start,
            quantity,
        })
    }

    /// Decode a request PDU. Trailing bytes after the quantity are ignored.
    pub fn parse(pdu: &[u8]) -> Result<Self> {
        let (&code, body) = pdu.split_first().ok_or_else(|| anyhow!("Empty PDU"))?;
        let function = FunctionCode::try_from(code)
            .map_err(|_| anyhow!("Unsupported function code: 0x{code:02X}"))?;
        if body.len() < 4 {
            return Err(anyhow!(
                "Truncated read request: expected 4 bytes after function code, got {}",
                body.len()
            ));
        }
        let start = u16::from_be_bytes([body[0], body[1]]);
        let quantity = u16::from_be_bytes([body[2], body[3]]);
        Self::new(function, start, quantity)
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        let [s_hi, s_lo] = self.start.to_be_bytes();
        let [q_hi, q_lo] = self.quantity.to_be_bytes();
        [self.function.into(), s_hi, s_lo, q_hi, q_lo]
    }

    /// Size of the data section in the response.
    pub fn byte_count(&self) -> usize {
        if self.function.is_bit_access() {
            usize::from(self.quantity).div_ceil(8)
        } else {
            usize::from(self.quantity) * 2
        }
    }
}

/// Pack bit results LSB-first: result `i` lands in byte `i / 8`, bit `i % 8`.
pub fn pack_bits(values: &[u16]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len().div_ceil(8)];
    for (i, value) in values.iter().enumerate() {
        if *value != 0 {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Synthesize the addressed values and build the response PDU
/// `{function, byteCount, data}` shared by the TCP and RTU transports.
pub fn build_read_response<R: Rng + ?Sized>(
    map: &RegisterMap,
    request: &ReadRequest,
    rng: &mut R,
) -> Bytes {
    let values = values_in_range(map, request.function, request.start, request.quantity, rng);

    let mut pdu = BytesMut::with_capacity(2 + request.byte_count());
    pdu.put_u8(request.function.into());
    pdu.put_u8(request.byte_count() as u8);
    if request.function.is_bit_access() {
        pdu.put_slice(&pack_bits(&values));
    } else {
        for value in values {
            pdu.put_u16(value);
        }
    }
    pdu.freeze()
}
