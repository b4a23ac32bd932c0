/// Initial accumulator value of the Modbus CRC16.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Modbus CRC16 (polynomial 0xA001, initial value 0xFFFF).
///
/// The result is transmitted low byte first in RTU frames.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |crc, &b| crc16_update(crc, b))
}

/// Fold one more byte into a running CRC16 accumulator.
pub fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= u16::from(byte);
    for _ in 0..8 {
        if crc & 0x0001 != 0 {
            crc >>= 1;
            crc ^= 0xA001;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// Check the little-endian CRC trailer of a complete RTU frame.
pub fn has_valid_crc(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - 2);
    crc16(body) == u16::from_le_bytes([trailer[0], trailer[1]])
}
