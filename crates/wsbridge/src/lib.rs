//! WebSocket gateway between browser-sandboxed clients and a peer-to-peer
//! overlay network.
//!
//! Clients that cannot open raw peer sockets send checksummed command frames
//! over a WebSocket; the gateway runs them against the overlay and answers
//! with the same correlation id, pushing unsolicited peer data to subscribed
//! connections.
//!
//! # Crate Structure
//!
//! - [`frame`] — Command frame codec and payload helpers
//! - [`transport`] — WebSocket connection handles
//! - [`client`] — Sandboxed-side client (behind `client` feature)
//! - [`server`] — Gateway dispatch, API sessions, stream fan-out (behind `server` feature)

/// Re-export frame types.
pub mod frame {
    pub use wsbridge_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use wsbridge_transport::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use wsbridge_client::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use wsbridge_server::*;
}
