use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;
use wsbridge_frame::CommandFrame;

use crate::error::Result;

/// Identity of one WebSocket connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

/// Anything frames can be written to.
///
/// Implementations serialize concurrent writers: the dispatch path and the
/// stream fan-out path may both write to one connection at the same time.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Stable identity of the underlying connection.
    fn id(&self) -> ConnectionId;

    /// Encode and write one frame.
    async fn send_frame(&self, frame: &CommandFrame) -> Result<()>;
}
