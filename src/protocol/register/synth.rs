use rand::Rng;

use super::{map::RegisterMap, types::FunctionCode};
use crate::protocol::modbus::encode_value;

/// Synthesize the value served at one address.
///
/// Unmapped addresses read as 0. Boolean entries draw a fresh 0/1 each time.
/// Numeric entries draw a fresh value from their range *per address* and
/// return the word at `address - offset` of its encoding. The two words of a
/// Float32 entry therefore come from two independent draws.
pub fn value_at<R: Rng + ?Sized>(
    map: &RegisterMap,
    function: FunctionCode,
    address: u16,
    rng: &mut R,
) -> u16 {
    let Some(entry) = map.lookup(function, address) else {
        return 0;
    };

    if !entry.data_type().is_numeric() {
        return u16::from(rng.random::<bool>());
    }

    let range = entry.range();
    let value = rng.random_range(range.min..=range.max);
    let words = encode_value(value, entry.data_type(), entry.byte_order());
    words
        .get(usize::from(address - entry.offset()))
        .copied()
        .unwrap_or_default()
}

/// Synthesize `quantity` consecutive addresses starting at `start`.
///
/// Callers validate `start + quantity <= 0x10000` beforehand.
pub fn values_in_range<R: Rng + ?Sized>(
    map: &RegisterMap,
    function: FunctionCode,
    start: u16,
    quantity: u16,
    rng: &mut R,
) -> Vec<u16> {
    (0..quantity)
        .map(|i| value_at(map, function, start.wrapping_add(i), rng))
        .collect()
}
