use tokio_tungstenite::tungstenite;
use wsbridge_frame::FrameError;

/// Errors that can occur on a WebSocket connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a client connection.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: tungstenite::Error,
    },

    /// The server-side upgrade handshake failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(tungstenite::Error),

    /// An error occurred on an established WebSocket.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A text message did not carry a valid frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A binary message arrived; the protocol only uses text messages.
    #[error("binary message rejected ({0} bytes)")]
    BinaryMessage(usize),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
