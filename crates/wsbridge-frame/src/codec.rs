use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::command::{CommandCode, CODE_MASK, ERROR_FLAG};
use crate::error::{FrameError, Result};
use crate::payload::stream_name_of;

/// Frame header: id (4) + command byte (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Trailing checksum byte.
pub const CHECKSUM_SIZE: usize = 1;

/// Smallest valid frame: header + checksum, empty payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Default maximum frame payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One request or response unit of the proxy protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Correlation id. 0 means uncorrelated (fire-and-forget or push).
    pub id: u32,
    /// The command this frame belongs to.
    pub code: CommandCode,
    /// When set, `payload` is a UTF-8 error message.
    pub is_error: bool,
    /// Command data, response data, or error text.
    pub payload: Bytes,
}

impl CommandFrame {
    /// Create an uncorrelated frame (id 0).
    pub fn new(code: CommandCode, payload: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            code,
            is_error: false,
            payload: payload.into(),
        }
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Create an error-flagged frame carrying `message`.
    pub fn error(code: CommandCode, id: u32, message: impl fmt::Display) -> Self {
        Self {
            id,
            code,
            is_error: true,
            payload: Bytes::from(message.to_string()),
        }
    }

    /// Create an unsolicited stream push frame.
    pub fn push(data: impl Into<Bytes>) -> Self {
        Self::new(CommandCode::Subscribe, data)
    }

    /// Successful response to this frame, preserving id and command.
    pub fn reply(&self, payload: impl Into<Bytes>) -> Self {
        Self::new(self.code, payload).with_id(self.id)
    }

    /// Error response to this frame, preserving id and command.
    pub fn reply_error(&self, message: impl fmt::Display) -> Self {
        Self::error(self.code, self.id, message)
    }

    /// True for uncorrelated data frames on the subscribe command.
    ///
    /// Push data always starts with a stream name, so the empty
    /// acknowledgement of a fire-and-forget `Subscribe` is not a push.
    pub fn is_push(&self) -> bool {
        self.id == 0
            && self.code == CommandCode::Subscribe
            && !self.is_error
            && stream_name_of(&self.payload).is_some()
    }

    /// The error message, if this frame is error-flagged.
    pub fn error_message(&self) -> Option<String> {
        self.is_error
            .then(|| String::from_utf8_lossy(&self.payload).into_owned())
    }

    /// Split into the payload or the remote error message.
    pub fn into_result(self) -> std::result::Result<Bytes, String> {
        if self.is_error {
            Err(String::from_utf8_lossy(&self.payload).into_owned())
        } else {
            Ok(self.payload)
        }
    }

    /// The command byte as it appears on the wire.
    pub fn command_byte(&self) -> u8 {
        if self.is_error {
            self.code.as_u8() | ERROR_FLAG
        } else {
            self.code.as_u8()
        }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf);
        buf.freeze()
    }

    /// Decode from a complete message.
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_frame(data)
    }
}

/// 8-bit wrapping sum of `data`.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┬───────────────┬────────────┐
/// │ Id (4B LE)   │ Command (1B)     │ Payload       │ Checksum   │
/// │              │ bit 7 = error    │ (0..N bytes)  │ (1B sum)   │
/// └──────────────┴──────────────────┴───────────────┴────────────┘
/// ```
pub fn encode_frame(frame: &CommandFrame, dst: &mut BytesMut) {
    let start = dst.len();
    dst.reserve(frame.wire_size());
    dst.put_u32_le(frame.id);
    dst.put_u8(frame.command_byte());
    dst.put_slice(&frame.payload);
    let sum = checksum(&dst[start..]);
    dst.put_u8(sum);
}

/// Decode a frame from one complete message.
///
/// Checks run in order: length, checksum, command range.
pub fn decode_frame(src: &[u8]) -> Result<CommandFrame> {
    if src.len() < MIN_FRAME_SIZE {
        return Err(FrameError::NotEnoughData {
            len: src.len(),
            min: MIN_FRAME_SIZE,
        });
    }

    let (body, trailer) = src.split_at(src.len() - CHECKSUM_SIZE);
    let expected = checksum(body);
    if expected != trailer[0] {
        return Err(FrameError::WrongChecksum {
            expected,
            actual: trailer[0],
        });
    }

    let id = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    let command = body[4];
    let code = CommandCode::try_from(command & CODE_MASK)?;

    Ok(CommandFrame {
        id,
        code,
        is_error: command & ERROR_FLAG != 0,
        payload: Bytes::copy_from_slice(&body[HEADER_SIZE..]),
    })
}
