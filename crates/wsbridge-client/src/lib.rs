//! Sandboxed-side client for the wsbridge gateway.
//!
//! A [`BridgeClient`] keeps one WebSocket to the gateway alive, hands out
//! correlation ids, and routes inbound frames through a [`ReaderRegistry`]:
//! one-shot readers for awaited responses and persistent readers for stream
//! pushes. Frames queued while the connection is down are dropped; replay
//! state from [`ClientConfig::on_reconnected`].

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod readers;
mod session;

pub use api::ApiClient;
pub use client::{BridgeClient, PendingResponse};
pub use config::{
    ws_url_for, ClientConfig, ReconnectHandler, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY,
    DEFAULT_RESPONSE_TIMEOUT, GATEWAY_PATH,
};
pub use error::{ClientError, Result};
pub use readers::{ReaderFn, ReaderId, ReaderRegistry};
