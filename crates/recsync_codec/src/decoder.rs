//! Frame decoder.

use crate::error::{CodecError, CodecResult};
use crate::frame::{Action, Message, Topic, FIELD_SEPARATOR, HEADER_FLAG, MESSAGE_SEPARATOR};
use crate::varint;

/// Decode every frame in a chunk.
///
/// Malformed frames show up as `Err` entries; the frames around them are
/// still decoded.
pub fn decode_frames(bytes: &[u8]) -> Vec<CodecResult<Message>> {
    FrameDecoder::new(bytes).collect()
}

/// Iterates over the frames of one inbound chunk.
///
/// A malformed frame yields an error and the decoder skips ahead to the
/// next message separator, so one bad frame never poisons the rest of the
/// chunk. A missing terminator on the last frame is tolerated.
pub struct FrameDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    max_frame_size: Option<usize>,
}

impl<'a> FrameDecoder<'a> {
    /// Create a decoder over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            max_frame_size: None,
        }
    }

    /// Reject frames larger than `max` bytes.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn parse_frame(&mut self) -> CodecResult<Message> {
        if self.data[self.pos] & HEADER_FLAG != 0 {
            self.parse_headered()
        } else {
            self.parse_plain()
        }
    }

    fn parse_plain(&mut self) -> CodecResult<Message> {
        let data = self.data;
        let end = self.find_byte(MESSAGE_SEPARATOR, self.pos);
        let frame = &data[self.pos..end];
        self.pos = (end + 1).min(self.data.len());

        let mut fields = frame.split(|b| *b == FIELD_SEPARATOR);
        let (topic, action) = match (fields.next(), fields.next()) {
            (Some(topic), Some(action)) => (topic, action),
            _ => return Err(CodecError::malformed("frame has fewer than 2 fields")),
        };
        let args = fields.map(utf8).collect::<CodecResult<Vec<_>>>()?;

        Ok(Message::new(parse_topic(topic)?, parse_action(action)?, args))
    }

    fn parse_headered(&mut self) -> CodecResult<Message> {
        let header_len = usize::from(self.data[self.pos] & !HEADER_FLAG);
        let header = self.slice(self.pos + 1, header_len)?;

        let mut lengths = Vec::new();
        let mut offset = 0;
        while offset < header.len() {
            let (len, used) = varint::decode(&header[offset..])?;
            lengths.push(len);
            offset += used;
        }

        let mut cursor = self.pos + 1 + header_len;
        let topic = parse_topic(self.slice(cursor, 1)?)?;
        cursor += 1;
        if self.slice(cursor, 1)? != [FIELD_SEPARATOR] {
            return Err(CodecError::malformed("missing separator after topic"));
        }
        cursor += 1;

        let action_end = self.find_byte(FIELD_SEPARATOR, cursor);
        if action_end >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let action = parse_action(&self.data[cursor..action_end])?;
        cursor = action_end + 1;

        let mut args = Vec::with_capacity(lengths.len());
        for len in lengths {
            args.push(utf8(self.slice(cursor, len)?)?);
            cursor += len;
        }

        match self.data.get(cursor) {
            None => self.pos = cursor,
            Some(&MESSAGE_SEPARATOR) => self.pos = cursor + 1,
            Some(_) => return Err(CodecError::malformed("trailing bytes after arguments")),
        }

        Ok(Message::new(topic, action, args))
    }

    fn slice(&self, start: usize, len: usize) -> CodecResult<&'a [u8]> {
        let end = start.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        self.data.get(start..end).ok_or(CodecError::UnexpectedEof)
    }

    fn find_byte(&self, byte: u8, from: usize) -> usize {
        self.data[from.min(self.data.len())..]
            .iter()
            .position(|b| *b == byte)
            .map_or(self.data.len(), |i| from + i)
    }

    fn resync(&mut self, start: usize) {
        self.pos = (self.find_byte(MESSAGE_SEPARATOR, start) + 1).min(self.data.len());
    }
}

impl Iterator for FrameDecoder<'_> {
    type Item = CodecResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() && self.data[self.pos] == MESSAGE_SEPARATOR {
            self.pos += 1;
        }
        if self.is_empty() {
            return None;
        }

        let start = self.pos;
        let result = self.parse_frame();
        if result.is_err() {
            self.resync(start);
        }

        let size = self.pos - start;
        match (result, self.max_frame_size) {
            (Ok(_), Some(max)) if size > max => Some(Err(CodecError::PacketTooLarge { size, max })),
            (result, _) => Some(result),
        }
    }
}

fn parse_topic(field: &[u8]) -> CodecResult<Topic> {
    match field {
        [code] => Topic::from_code(*code),
        _ => Err(CodecError::malformed("topic must be a single byte")),
    }
}

fn parse_action(field: &[u8]) -> CodecResult<Action> {
    let code = std::str::from_utf8(field).map_err(|_| CodecError::InvalidUtf8)?;
    Action::from_code(code)
}

fn utf8(field: &[u8]) -> CodecResult<String> {
    String::from_utf8(field.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_frame;

    #[test]
    fn decodes_several_frames_per_chunk() {
        let frames = decode_frames(b"C\x1fPI\x1eR\x1fS\x1fdoc\x1e");
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].as_ref().unwrap(),
            &Message::bare(Topic::Connection, Action::Ping)
        );
        assert_eq!(frames[1].as_ref().unwrap().args, vec!["doc".to_string()]);
    }

    #[test]
    fn tolerates_missing_final_terminator() {
        let frames = decode_frames(b"R\x1fUS\x1fdoc");
        assert_eq!(
            frames[0].as_ref().unwrap(),
            &Message::new(Topic::Record, Action::Unsubscribe, vec!["doc".into()])
        );
    }

    #[test]
    fn short_frame_is_dropped_and_decoding_continues() {
        let frames = decode_frames(b"R\x1eC\x1fPI\x1e");
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(CodecError::Malformed { .. })));
        assert!(frames[1].is_ok());
    }

    #[test]
    fn unknown_topic_and_action() {
        let frames = decode_frames(b"Z\x1fA\x1eR\x1fNOPE\x1e");
        assert_eq!(frames[0], Err(CodecError::UnknownTopic(b'Z')));
        assert!(matches!(frames[1], Err(CodecError::UnknownAction(_))));
    }

    #[test]
    fn headered_roundtrip_with_separators_in_arguments() {
        let message = Message::new(
            Topic::Rpc,
            Action::Request,
            vec!["x\u{1e}y".into(), String::new(), "\u{1f}".into()],
        );
        let frame = to_frame(&message).unwrap();
        let mut chunk = frame.to_vec();
        chunk.extend_from_slice(b"C\x1fPO\x1e");

        let frames = decode_frames(&chunk);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &message);
        assert_eq!(
            frames[1].as_ref().unwrap(),
            &Message::bare(Topic::Connection, Action::Pong)
        );
    }

    #[test]
    fn truncated_header_is_an_error() {
        let frames = decode_frames(&[HEADER_FLAG | 4, 1]);
        assert_eq!(frames, vec![Err(CodecError::UnexpectedEof)]);
    }

    #[test]
    fn invalid_utf8_argument() {
        let frames = decode_frames(b"R\x1fS\x1f\xff\xfe\x1e");
        assert_eq!(frames, vec![Err(CodecError::InvalidUtf8)]);
    }

    #[test]
    fn oversized_frame_is_reported() {
        let frames: Vec<_> = FrameDecoder::new(b"R\x1fS\x1fdocument\x1eC\x1fPI\x1e")
            .with_max_frame_size(8)
            .collect();
        assert_eq!(
            frames[0],
            Err(CodecError::PacketTooLarge { size: 13, max: 8 })
        );
        assert!(frames[1].is_ok());
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        assert!(decode_frames(b"").is_empty());
        assert!(decode_frames(b"\x1e\x1e").is_empty());
    }
}
