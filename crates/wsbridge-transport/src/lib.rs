//! WebSocket connection handles for the wsbridge protocol.
//!
//! Each text message carries one base64-encoded [`CommandFrame`]. This crate
//! owns the upgrade/connect calls and the per-connection write lock; callers
//! above it only see [`FrameSink`] and decoded frames.
//!
//! [`CommandFrame`]: wsbridge_frame::CommandFrame

pub mod error;
pub mod traits;
pub mod ws;

pub use error::{Result, TransportError};
pub use traits::{ConnectionId, FrameSink};
pub use ws::{accept, connect, read_frame, split, Connection, Inbound, MessageStream};
