mod codec;
mod crc;
mod frame;
mod header;
mod pdu;

pub use codec::encode_value;
pub use crc::{crc16, has_valid_crc};
pub use frame::{
    build_rtu_request, build_rtu_response, parse_rtu_request, RtuFramer, MAX_RTU_ADU_LEN,
    RTU_READ_REQUEST_LEN,
};
pub use header::{build_tcp_response, MbapHeader, MAX_PDU_LEN, MBAP_HEADER_LEN};
pub use pdu::{build_read_response, pack_bits, ReadRequest};
