/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than id + command + checksum.
    #[error("not enough data ({len} bytes, need at least {min})")]
    NotEnoughData { len: usize, min: usize },

    /// The trailing checksum byte does not match the frame contents.
    #[error("wrong checksum (expected {expected:#04x}, got {actual:#04x})")]
    WrongChecksum { expected: u8, actual: u8 },

    /// The 7-bit command code is outside the defined command set.
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// The message exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The WebSocket text message is not valid base64.
    #[error("invalid base64 message: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// A command payload does not follow its comma-separated layout.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, FrameError>;
