use std::net::SocketAddr;
use std::time::Duration;

use wsbridge_frame::FrameError;

/// Failures reported by the overlay network collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OverlayError {
    /// The overlay network itself cannot be reached.
    #[error("overlay network unreachable: {0}")]
    Unreachable(String),

    /// No peer answers at this address.
    #[error("peer {0} not found")]
    PeerNotFound(String),

    /// The overlay client is not connected yet.
    #[error("not connected to overlay network")]
    NotConnected,

    /// The remote peer answered an API command with an error.
    #[error("{0}")]
    Api(String),
}

/// Errors answered to the client as an error-flagged frame.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("can't connect to peer {peer}, error: {source}")]
    PeerConnect { peer: String, source: OverlayError },

    #[error("can't connect to peer {peer} api, error: {source}")]
    ApiSession { peer: String, source: OverlayError },

    /// `SendToPeerAPI` for a peer without an API session.
    #[error("has not connected to peer api {0}")]
    UnknownPeer(String),

    #[error("peer {peer} did not answer within {timeout:?}")]
    Timeout { peer: String, timeout: Duration },

    #[error("peer {peer} api error: {message}")]
    Api { peer: String, message: String },

    /// The overlay dropped the request without answering.
    #[error("peer {0} dropped the api request")]
    Abandoned(String),

    #[error("wrong command data: {0}")]
    Payload(#[from] FrameError),
}

/// Errors that stop the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The initial overlay connection failed; the gateway cannot start.
    #[error("can't connect to overlay network: {0}")]
    OverlayConnect(#[source] OverlayError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
