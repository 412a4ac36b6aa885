//! Inbound payload shapes.

use bytes::Bytes;

/// A chunk delivered by a transport.
///
/// Transports may hand over text frames or binary frames; both normalize
/// to a byte view before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text delivery.
    Text(String),
    /// Binary delivery.
    Binary(Bytes),
}

impl Payload {
    /// Returns the payload as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(bytes))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shapes_share_a_byte_view() {
        let text = Payload::from("R\u{1f}S");
        let vec = Payload::from(b"R\x1fS".to_vec());
        let buf = Payload::from(Bytes::from_static(b"R\x1fS"));
        assert_eq!(text.as_bytes(), vec.as_bytes());
        assert_eq!(vec.as_bytes(), buf.as_bytes());
        assert_eq!(text.len(), 3);
        assert!(!text.is_empty());
    }
}
