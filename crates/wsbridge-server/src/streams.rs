use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use wsbridge_frame::CommandFrame;
use wsbridge_transport::{ConnectionId, FrameSink};

/// Pushes a subscriber may have waiting before further pushes to it are dropped.
pub const DEFAULT_PUSH_QUEUE: usize = 64;

/// Key a stream is filed under: its name up to the first `/`.
///
/// `video/96` and `video` subscribe to the same stream; the suffix carries
/// stream parameters.
pub fn stream_key(stream: &str) -> &str {
    stream.split('/').next().unwrap_or(stream)
}

/// Push path to one subscribed connection.
///
/// Each connection gets its own bounded queue and writer task, so a client
/// that stops reading only loses its own pushes.
struct Outlet {
    conn: Arc<dyn FrameSink>,
    queue: mpsc::Sender<CommandFrame>,
    writer: AbortHandle,
    /// Number of `(peer, stream)` entries referencing this connection.
    streams: usize,
}

impl Outlet {
    fn open(conn: Arc<dyn FrameSink>, capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(capacity);
        let writer = tokio::spawn(write_pushes(Arc::clone(&conn), rx)).abort_handle();
        Self {
            conn,
            queue,
            writer,
            streams: 0,
        }
    }
}

async fn write_pushes(conn: Arc<dyn FrameSink>, mut queue: mpsc::Receiver<CommandFrame>) {
    while let Some(frame) = queue.recv().await {
        if let Err(err) = conn.send_frame(&frame).await {
            tracing::warn!(conn = %conn.id(), error = %err, "failed to push stream data");
            return;
        }
    }
}

#[derive(Default)]
struct Routes {
    peers: HashMap<String, HashMap<String, Vec<ConnectionId>>>,
    outlets: HashMap<ConnectionId, Outlet>,
}

impl Routes {
    /// Drop one stream reference to `id`; the outlet goes with the last one
    /// and its writer finishes what is already queued.
    fn release(&mut self, id: ConnectionId) {
        if let Some(outlet) = self.outlets.get_mut(&id) {
            outlet.streams = outlet.streams.saturating_sub(1);
            if outlet.streams == 0 {
                self.outlets.remove(&id);
            }
        }
    }
}

/// `(peer, stream) -> connections` routing for unsolicited peer data.
///
/// Empty stream entries and peers without streams are pruned as soon as they
/// become empty. Subscribing spawns the connection's push writer, so it must
/// happen inside a tokio runtime.
pub struct StreamTable {
    queue_capacity: usize,
    routes: RwLock<Routes>,
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::with_queue_capacity(DEFAULT_PUSH_QUEUE)
    }
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose subscribers may each lag `capacity` pushes behind.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            queue_capacity: capacity.max(1),
            routes: RwLock::new(Routes::default()),
        }
    }

    /// Add `conn` to `(peer, stream)`. Returns `false` if it was already there.
    pub fn subscribe(&self, peer: &str, stream: &str, conn: Arc<dyn FrameSink>) -> bool {
        let mut routes = self.routes.write();
        let id = conn.id();
        let subscribers = routes
            .peers
            .entry(peer.to_string())
            .or_default()
            .entry(stream.to_string())
            .or_default();
        if subscribers.contains(&id) {
            return false;
        }
        subscribers.push(id);

        let capacity = self.queue_capacity;
        routes
            .outlets
            .entry(id)
            .or_insert_with(|| Outlet::open(conn, capacity))
            .streams += 1;
        true
    }

    /// Remove one connection from one stream.
    pub fn unsubscribe(&self, peer: &str, stream: &str, conn: ConnectionId) -> bool {
        let mut routes = self.routes.write();
        let Some(streams) = routes.peers.get_mut(peer) else {
            return false;
        };
        let Some(subscribers) = streams.get_mut(stream) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|existing| *existing != conn);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            streams.remove(stream);
        }
        if streams.is_empty() {
            routes.peers.remove(peer);
        }
        if removed {
            routes.release(conn);
        }
        removed
    }

    /// Remove `conn` from every stream and stop its push writer.
    /// Returns how many entries it left.
    pub fn unsubscribe_connection(&self, conn: ConnectionId) -> usize {
        let mut routes = self.routes.write();
        let mut removed = 0;

        routes.peers.retain(|_, streams| {
            streams.retain(|_, subscribers| {
                let before = subscribers.len();
                subscribers.retain(|existing| *existing != conn);
                removed += before - subscribers.len();
                !subscribers.is_empty()
            });
            !streams.is_empty()
        });
        if let Some(outlet) = routes.outlets.remove(&conn) {
            outlet.writer.abort();
        }
        removed
    }

    /// Drop every subscription for `peer`.
    pub fn remove_peer(&self, peer: &str) -> bool {
        let mut routes = self.routes.write();
        let Some(streams) = routes.peers.remove(peer) else {
            return false;
        };
        for id in streams.into_values().flatten() {
            routes.release(id);
        }
        true
    }

    /// Snapshot of the connections subscribed to `(peer, stream)`.
    pub fn subscribers(&self, peer: &str, stream: &str) -> Vec<Arc<dyn FrameSink>> {
        let routes = self.routes.read();
        routes
            .peers
            .get(peer)
            .and_then(|streams| streams.get(stream))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| routes.outlets.get(id))
                    .map(|outlet| Arc::clone(&outlet.conn))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_subscribers(&self, peer: &str, stream: &str) -> bool {
        self.routes
            .read()
            .peers
            .get(peer)
            .is_some_and(|streams| streams.contains_key(stream))
    }

    /// Number of `(peer, stream)` entries.
    pub fn len(&self) -> usize {
        self.routes.read().peers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().peers.is_empty()
    }

    /// Queue `data` for every subscriber of `(peer, stream)`.
    ///
    /// Never waits on a socket. A subscriber whose queue is full misses this
    /// push; the others are unaffected. Returns the number of connections the
    /// push was queued for.
    pub fn deliver(&self, peer: &str, stream: &str, data: Bytes) -> usize {
        let routes = self.routes.read();
        let Some(ids) = routes.peers.get(peer).and_then(|streams| streams.get(stream)) else {
            return 0;
        };

        let frame = CommandFrame::push(data);
        let mut queued = 0;
        for id in ids {
            let Some(outlet) = routes.outlets.get(id) else {
                continue;
            };
            match outlet.queue.try_send(frame.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(conn = %id, peer, stream, "subscriber lagging, push dropped")
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(conn = %id, peer, stream, "subscriber writer stopped")
                }
            }
        }
        tracing::trace!(peer, stream, len = frame.payload.len(), queued, "stream data queued");
        queued
    }
}

impl std::fmt::Debug for StreamTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTable")
            .field("entries", &self.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}
