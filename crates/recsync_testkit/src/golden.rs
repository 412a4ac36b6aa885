//! Hex helpers for comparing frames against golden bytes.

/// Encodes bytes as hexadecimal string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes hexadecimal string to bytes.
///
/// Whitespace is ignored so long vectors can be wrapped.
///
/// # Panics
///
/// Panics on odd length or non-hex characters.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex = hex.replace([' ', '\n', '\r'], "");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}

/// Renders a frame with separators spelled out, for assertion messages.
///
/// `0x1F` becomes `|`, `0x1E` becomes `;` and other control or non-ASCII
/// bytes are shown as `\xNN`.
pub fn describe_frame(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            0x1f => out.push('|'),
            0x1e => out.push(';'),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let original = vec![0x00, 0x01, 0xff, 0xab, 0xcd];
        let encoded = hex_encode(&original);
        let decoded = hex_decode(&encoded);
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_describe_frame() {
        assert_eq!(describe_frame(b"R\x1fS\x1fdoc\x1e"), "R|S|doc;");
        assert_eq!(describe_frame(&[0x81, 0x03]), "\\x81\\x03");
    }
}
