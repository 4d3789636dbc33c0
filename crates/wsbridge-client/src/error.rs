use std::time::Duration;

/// Errors that can occur on the client side of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wsbridge_transport::TransportError),

    /// Frame or payload encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] wsbridge_frame::FrameError),

    /// No matching response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The gateway answered with an error frame.
    #[error("remote error: {0}")]
    Remote(String),

    /// The client was shut down.
    #[error("client is shut down")]
    Disconnected,

    /// The first connection to the gateway did not come up in time.
    #[error("gateway not reachable within {0:?}")]
    ConnectTimeout(Duration),

    /// A URL could not be mapped to a gateway endpoint.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
