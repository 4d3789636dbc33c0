//! Text encoding of frames: one base64 (standard, padded) frame per
//! WebSocket text message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::codec::{decode_frame, CommandFrame, MIN_FRAME_SIZE};
use crate::error::{FrameError, Result};

/// Encode a frame as the body of a WebSocket text message.
pub fn encode_text(frame: &CommandFrame) -> String {
    STANDARD.encode(frame.encode())
}

/// Decode a WebSocket text message into a frame.
///
/// Messages that would decode to more than `max_payload` payload bytes are
/// rejected before any base64 work is done.
pub fn decode_text(text: &str, max_payload: usize) -> Result<CommandFrame> {
    let text = text.trim();
    let decoded_len = text.len() / 4 * 3;
    let max_frame = max_payload.saturating_add(MIN_FRAME_SIZE);
    if decoded_len > max_frame.saturating_add(2) {
        return Err(FrameError::PayloadTooLarge {
            size: decoded_len.saturating_sub(MIN_FRAME_SIZE),
            max: max_payload,
        });
    }

    let bytes = STANDARD.decode(text)?;
    decode_frame(&bytes)
}
