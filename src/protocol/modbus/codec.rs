use crate::protocol::register::{ByteOrder, DataType};

/// Encode a synthesized value into the register words of `data_type`.
///
/// Always yields `data_type.word_count()` words. There is no decode side:
/// the emulator only ever produces values.
pub fn encode_value(value: f64, data_type: DataType, byte_order: ByteOrder) -> Vec<u16> {
    match data_type {
        DataType::Boolean => vec![u16::from(value != 0.0)],
        DataType::Float32 => byte_order.arrange((value as f32).to_be_bytes()).to_vec(),
        // Truncate toward zero, then keep the low 16 bits (two's complement
        // for negative values).
        DataType::Int16Signed | DataType::Int16Unsigned => vec![(value as i64 & 0xFFFF) as u16],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    /// Undo the documented permutation to get the big-endian bytes back.
    fn restore_be_bytes(words: &[u16], order: ByteOrder) -> [u8; 4] {
        let [w0, w1] = [words[0].to_be_bytes(), words[1].to_be_bytes()];
        match order {
            ByteOrder::Abcd => [w0[0], w0[1], w1[0], w1[1]],
            ByteOrder::Badc => [w0[1], w0[0], w1[1], w1[0]],
            ByteOrder::Cdab => [w1[0], w1[1], w0[0], w0[1]],
            ByteOrder::Dcba => [w1[1], w1[0], w0[1], w0[0]],
        }
    }

    #[test]
    fn float32_word_layouts() {
        // 1.0f32 == 0x3F80_0000
        let cases = [
            (ByteOrder::Abcd, [0x3F80, 0x0000]),
            (ByteOrder::Badc, [0x803F, 0x0000]),
            (ByteOrder::Cdab, [0x0000, 0x3F80]),
            (ByteOrder::Dcba, [0x0000, 0x803F]),
        ];
        for (order, expected) in cases {
            assert_eq!(encode_value(1.0, DataType::Float32, order), expected, "{order}");
        }
    }

    #[test]
    fn float32_permutations_are_reversible() {
        for value in [123.456_f64, -0.5, 0.0, 3.4e38, -1.0e-20] {
            let expected = (value as f32).to_be_bytes();
            for order in ByteOrder::iter() {
                let words = encode_value(value, DataType::Float32, order);
                assert_eq!(words.len(), 2);
                assert_eq!(restore_be_bytes(&words, order), expected, "{value} {order}");
            }
        }
    }

    #[test]
    fn int16_truncates_and_masks() {
        assert_eq!(encode_value(100.9, DataType::Int16Unsigned, ByteOrder::Abcd), [100]);
        assert_eq!(encode_value(-1.0, DataType::Int16Signed, ByteOrder::Abcd), [0xFFFF]);
        assert_eq!(encode_value(-2.7, DataType::Int16Signed, ByteOrder::Abcd), [0xFFFE]);
        assert_eq!(encode_value(65537.0, DataType::Int16Unsigned, ByteOrder::Abcd), [1]);
        // Byte order has no effect on single-word types.
        assert_eq!(encode_value(258.0, DataType::Int16Unsigned, ByteOrder::Dcba), [0x0102]);
    }

    #[test]
    fn boolean_is_zero_or_one() {
        assert_eq!(encode_value(0.0, DataType::Boolean, ByteOrder::Abcd), [0]);
        assert_eq!(encode_value(0.3, DataType::Boolean, ByteOrder::Abcd), [1]);
        assert_eq!(encode_value(-4.0, DataType::Boolean, ByteOrder::Abcd), [1]);
    }
}
