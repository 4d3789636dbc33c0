use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use wsbridge_frame::DEFAULT_MAX_PAYLOAD;

use crate::streams::DEFAULT_PUSH_QUEUE;

/// How long a `SendToPeerAPI` relay waits for the peer's answer.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_PORT: u16 = 8080;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub listen_addr: SocketAddr,
    pub api_timeout: Duration,
    /// Largest payload accepted in one inbound frame.
    pub max_payload_size: usize,
    /// Pushes one subscriber may lag behind before it starts missing them.
    pub push_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            api_timeout: DEFAULT_API_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            push_queue_size: DEFAULT_PUSH_QUEUE,
        }
    }
}
