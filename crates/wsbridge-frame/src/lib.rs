//! Checksummed command frames for the wsbridge proxy protocol.
//!
//! Every WebSocket text message carries exactly one base64-encoded frame:
//! - A 4-byte little-endian correlation id
//! - A command byte (7-bit code, bit 7 = error flag)
//! - The payload
//! - A 1-byte wrapping sum of everything before it
//!
//! The frame layer knows nothing about sockets; see `wsbridge-transport`.

pub mod codec;
pub mod command;
pub mod error;
pub mod payload;
pub mod text;

pub use codec::{
    checksum, decode_frame, encode_frame, CommandFrame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MIN_FRAME_SIZE,
};
pub use command::{command_name, CommandCode, CODE_MASK, ERROR_FLAG};
pub use error::{FrameError, Result};
pub use payload::{
    encode_api_request, encode_subscribe, parse_api_request, parse_subscribe, stream_name_of,
    ApiRequest, StreamRef,
};
pub use text::{decode_text, encode_text};
