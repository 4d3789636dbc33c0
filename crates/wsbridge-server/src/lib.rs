//! Gateway side of the wsbridge proxy.
//!
//! The [`Gateway`] holds the only overlay network client. WebSocket clients
//! send it framed commands; it answers each with the same correlation id and
//! pushes unsolicited peer data to every connection subscribed to that
//! `(peer, stream)`.

pub mod api_clients;
pub mod config;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod overlay;
pub mod streams;

pub use api_clients::ApiClientRegistry;
pub use config::{ServerConfig, DEFAULT_API_TIMEOUT, DEFAULT_PORT};
pub use error::{DispatchError, OverlayError, Result, ServerError};
pub use gateway::{Gateway, CONNECTED_REPLY};
pub use listener::{bind, serve};
pub use overlay::{
    ApiSession, CommandHandler, MemoryOverlay, MemoryPeer, Overlay, PacketHandler, ReplyFn,
};
pub use streams::{stream_key, StreamTable, DEFAULT_PUSH_QUEUE};
