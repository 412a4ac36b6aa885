//! LEB128 unsigned integers used in frame headers.

use crate::error::{CodecError, CodecResult};

/// Appends `value` as LEB128.
pub(crate) fn encode(mut value: usize, out: &mut Vec<u8>) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads one LEB128 value from the front of `input`, returning it and the
/// number of bytes consumed.
pub(crate) fn decode(input: &[u8]) -> CodecResult<(usize, usize)> {
    let mut value: usize = 0;
    for (i, byte) in input.iter().enumerate() {
        let shift = 7 * i;
        if shift >= usize::BITS as usize {
            return Err(CodecError::malformed("varint overflow"));
        }
        value |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::UnexpectedEof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_take_one_byte() {
        let mut out = Vec::new();
        encode(5, &mut out);
        assert_eq!(out, vec![5]);
        assert_eq!(decode(&out).unwrap(), (5, 1));
    }

    #[test]
    fn multi_byte_values() {
        let mut out = Vec::new();
        encode(300, &mut out);
        assert_eq!(out, vec![0xac, 0x02]);
        assert_eq!(decode(&out).unwrap(), (300, 2));
    }

    #[test]
    fn truncated_input() {
        assert_eq!(decode(&[0x80]), Err(CodecError::UnexpectedEof));
        assert_eq!(decode(&[]), Err(CodecError::UnexpectedEof));
    }
}
