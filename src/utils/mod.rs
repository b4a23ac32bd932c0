//! Small helpers shared across the crate.

/// Convert a byte slice into an uppercase hexadecimal string separated by spaces.
pub fn format_hex_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
