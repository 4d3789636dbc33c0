use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{ApiSession, Overlay, PacketHandler, ReplyFn};
use crate::error::OverlayError;

/// Handler for one API command: `data -> answer or error message`.
pub type CommandHandler = Arc<dyn Fn(Bytes) -> Result<Bytes, String> + Send + Sync>;

/// A simulated peer with named API commands.
#[derive(Clone)]
pub struct MemoryPeer {
    address: String,
    commands: HashMap<String, CommandHandler>,
    latency: Duration,
    silent: bool,
}

impl MemoryPeer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            commands: HashMap::new(),
            latency: Duration::ZERO,
            silent: false,
        }
    }

    /// A peer whose `echo` command returns its input.
    pub fn echo(address: impl Into<String>) -> Self {
        Self::new(address).on("echo", Ok)
    }

    /// Register a command handler.
    pub fn on<F>(mut self, command: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Bytes) -> Result<Bytes, String> + Send + Sync + 'static,
    {
        self.commands.insert(command.into(), Arc::new(handler));
        self
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Never answer API commands.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&String> = self.commands.keys().collect();
        commands.sort();
        f.debug_struct("MemoryPeer")
            .field("address", &self.address)
            .field("commands", &commands)
            .field("latency", &self.latency)
            .field("silent", &self.silent)
            .finish()
    }
}

/// In-process overlay network for local runs and tests.
#[derive(Default)]
pub struct MemoryOverlay {
    peers: RwLock<HashMap<String, Arc<MemoryPeer>>>,
    on_packet: RwLock<Option<PacketHandler>>,
    offline: bool,
    sessions_created: AtomicUsize,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// An overlay whose `connect` always fails.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_peer(self, peer: MemoryPeer) -> Self {
        self.add_peer(peer);
        self
    }

    pub fn add_peer(&self, peer: MemoryPeer) {
        self.peers
            .write()
            .insert(peer.address.clone(), Arc::new(peer));
    }

    pub fn is_connected(&self) -> bool {
        self.on_packet.read().is_some()
    }

    /// Number of API sessions opened so far.
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Emit an unsolicited packet from `peer`. Returns whether it was handled.
    pub fn push(&self, peer: &str, data: &[u8]) -> bool {
        let handler = self.on_packet.read().clone();
        match handler {
            Some(handler) => handler(peer, data),
            None => false,
        }
    }

    fn peer(&self, address: &str) -> Result<Arc<MemoryPeer>, OverlayError> {
        if !self.is_connected() {
            return Err(OverlayError::NotConnected);
        }
        self.peers
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| OverlayError::PeerNotFound(address.to_string()))
    }
}

impl fmt::Debug for MemoryOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryOverlay")
            .field("peers", &self.peers.read().len())
            .field("connected", &self.is_connected())
            .field("offline", &self.offline)
            .finish()
    }
}

#[async_trait]
impl Overlay for MemoryOverlay {
    async fn connect(&self, on_packet: PacketHandler) -> Result<(), OverlayError> {
        if self.offline {
            return Err(OverlayError::Unreachable("memory overlay is offline".into()));
        }
        *self.on_packet.write() = Some(on_packet);
        tracing::debug!("memory overlay connected");
        Ok(())
    }

    async fn connect_to_peer(&self, address: &str) -> Result<(), OverlayError> {
        self.peer(address).map(|_| ())
    }

    async fn new_api_session(&self, address: &str) -> Result<Arc<dyn ApiSession>, OverlayError> {
        let peer = self.peer(address)?;
        // Session setup is a network round trip on a real overlay.
        tokio::task::yield_now().await;
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession { peer }))
    }
}

struct MemorySession {
    peer: Arc<MemoryPeer>,
}

impl ApiSession for MemorySession {
    fn address(&self) -> &str {
        &self.peer.address
    }

    fn send(&self, command: &str, data: Bytes, reply: ReplyFn) {
        if self.peer.silent {
            tracing::trace!(peer = %self.peer.address, command, "silent peer ignores request");
            return;
        }
        let handler = self.peer.commands.get(command).cloned();
        let command = command.to_string();
        let latency = self.peer.latency;

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let answer = match handler {
                Some(handler) => handler(data).map_err(OverlayError::Api),
                None => Err(OverlayError::Api(format!("unknown command {command}"))),
            };
            reply(answer);
        });
    }
}
