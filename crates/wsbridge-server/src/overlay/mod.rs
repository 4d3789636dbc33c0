//! The overlay network as seen by the gateway.
//!
//! The gateway owns one overlay client. It never talks to peers directly; it
//! calls these traits and receives unsolicited packets through the handler
//! given to [`Overlay::connect`].

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::OverlayError;

pub use memory::{CommandHandler, MemoryOverlay, MemoryPeer};

/// Callback for unsolicited packets: `(peer address, packet data) -> handled`.
pub type PacketHandler = Arc<dyn Fn(&str, &[u8]) -> bool + Send + Sync>;

/// Completion callback for one API command.
pub type ReplyFn = Box<dyn FnOnce(Result<Bytes, OverlayError>) + Send>;

/// Client of the peer-to-peer overlay network.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Join the network. `on_packet` receives every unsolicited packet.
    async fn connect(&self, on_packet: PacketHandler) -> Result<(), OverlayError>;

    /// Establish a connection to one peer.
    async fn connect_to_peer(&self, address: &str) -> Result<(), OverlayError>;

    /// Open an API session with one peer.
    async fn new_api_session(&self, address: &str) -> Result<Arc<dyn ApiSession>, OverlayError>;
}

/// An API session with one remote peer.
pub trait ApiSession: Send + Sync {
    fn address(&self) -> &str;

    /// Send `command` with `data`; `reply` runs once when the peer answers.
    ///
    /// `reply` may never run if the peer stays silent.
    fn send(&self, command: &str, data: Bytes, reply: ReplyFn);
}
