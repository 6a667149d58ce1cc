//! Event stream framing
//!
//! Each event travels as a single `text/event-stream` data line:
//!
//! ```text
//! data: {"type":"ping"}\n\n
//! ```
//!
//! Frames are encoded once per publish into a `Bytes` buffer that every
//! subscriber shares by reference count.

use bytes::{BufMut, Bytes, BytesMut};

use super::chat::ChatEvent;

const DATA_PREFIX: &[u8] = b"data: ";
const FRAME_END: &[u8] = b"\n\n";

/// Framing errors
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Payload could not be serialized or parsed
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Input is not a `data: ...\n\n` frame
    #[error("malformed frame")]
    Malformed,
}

/// Encode an event into a complete frame
pub fn encode(event: &ChatEvent) -> Result<Bytes, FrameError> {
    let json = serde_json::to_vec(event)?;

    let mut buf = BytesMut::with_capacity(DATA_PREFIX.len() + json.len() + FRAME_END.len());
    buf.put_slice(DATA_PREFIX);
    buf.put_slice(&json);
    buf.put_slice(FRAME_END);

    Ok(buf.freeze())
}

/// Decode one complete frame back into an event
pub fn decode(frame: &[u8]) -> Result<ChatEvent, FrameError> {
    let body = frame
        .strip_prefix(DATA_PREFIX)
        .and_then(|rest| rest.strip_suffix(FRAME_END))
        .ok_or(FrameError::Malformed)?;

    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RoomId;

    #[test]
    fn test_ping_frame_bytes() {
        let frame = encode(&ChatEvent::ping()).unwrap();
        assert_eq!(&frame[..], b"data: {\"type\":\"ping\"}\n\n");
    }

    #[test]
    fn test_frame_is_single_line() {
        let room = RoomId::new("lobby").unwrap();
        let event = ChatEvent::user_joined(room, "line\nbreak");
        let frame = encode(&event).unwrap();

        // JSON escapes embedded newlines, so only the terminator remains
        let newlines = frame.iter().filter(|b| **b == b'\n').count();
        assert_eq!(newlines, 2);
        assert!(frame.ends_with(b"\n\n"));
    }

    #[test]
    fn test_decode_encoded_frame() {
        let room = RoomId::new("lobby").unwrap();
        let event = ChatEvent::connected(room);
        let frame = encode(&event).unwrap();

        assert_eq!(decode(&frame).unwrap(), event);
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        let result = decode(b"{\"type\":\"ping\"}\n\n");
        assert!(matches!(result, Err(FrameError::Malformed)));
    }

    #[test]
    fn test_decode_rejects_unterminated() {
        let result = decode(b"data: {\"type\":\"ping\"}\n");
        assert!(matches!(result, Err(FrameError::Malformed)));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let result = decode(b"data: {\"type\":\"typing\"}\n\n");
        assert!(matches!(result, Err(FrameError::Json(_))));
    }
}
