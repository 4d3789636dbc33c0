use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wsbridge_frame::{encode_subscribe, stream_name_of, CommandCode, CommandFrame};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::readers::{ReaderId, ReaderRegistry};
use crate::session::{self, Session};

/// Handle to one gateway connection.
///
/// Cheap to clone; all clones share the outbound queue, the reader registry
/// and the id counter. The background session stops when the last clone is
/// dropped or [`BridgeClient::close`] is called.
#[derive(Clone)]
pub struct BridgeClient {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    outbound: mpsc::UnboundedSender<CommandFrame>,
    readers: Arc<ReaderRegistry>,
    next_id: AtomicU32,
    response_timeout: Duration,
    shutdown: CancellationToken,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl BridgeClient {
    /// Start the session and wait for the first connection.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let readers = Arc::new(ReaderRegistry::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let client = Self::from_parts(
            outbound,
            Arc::clone(&readers),
            config.response_timeout,
            shutdown.clone(),
        );

        let (ready_tx, ready_rx) = oneshot::channel();
        let state = Session {
            url: config.url.clone(),
            reconnect_delay: config.reconnect_delay,
            max_payload: config.max_payload_size,
            readers,
            outbound: outbound_rx,
            client: Arc::downgrade(&client.inner),
            on_reconnected: config.on_reconnected.clone(),
            ready: Some(ready_tx),
            shutdown,
        };
        *client.inner.session.lock() = Some(tokio::spawn(session::run(state)));

        match tokio::time::timeout(config.connect_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(client),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                client.close();
                Err(ClientError::ConnectTimeout(config.connect_timeout))
            }
        }
    }

    /// Assemble a client over an existing outbound queue and registry.
    ///
    /// Whoever owns the receiving end of `outbound` plays the role of the
    /// gateway connection; frames it receives should be fed back through
    /// [`ReaderRegistry::dispatch`].
    pub fn from_parts(
        outbound: mpsc::UnboundedSender<CommandFrame>,
        readers: Arc<ReaderRegistry>,
        response_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        readers.register(log_uncorrelated_reply);
        Self {
            inner: Arc::new(Inner {
                outbound,
                readers,
                next_id: AtomicU32::new(0),
                response_timeout,
                shutdown,
                session: Mutex::new(None),
            }),
        }
    }

    /// The registry inbound frames are dispatched to.
    pub fn readers(&self) -> &Arc<ReaderRegistry> {
        &self.inner.readers
    }

    pub fn response_timeout(&self) -> Duration {
        self.inner.response_timeout
    }

    /// Stop the background session.
    ///
    /// Frames already queued are still written before the socket closes.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    /// Close and wait until the session has flushed and closed the socket.
    pub async fn shutdown(&self) {
        self.close();
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            if let Err(err) = session.await {
                tracing::warn!(error = %err, "session task failed");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Allocate the next correlation id. Never returns 0.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }

    /// Queue a frame as-is.
    pub fn send(&self, frame: CommandFrame) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Disconnected);
        }
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| ClientError::Disconnected)
    }

    /// Queue an uncorrelated (id 0) command.
    pub fn notify(&self, code: CommandCode, payload: impl Into<Bytes>) -> Result<()> {
        self.send(CommandFrame::new(code, payload))
    }

    /// Queue a correlated command and return its id without waiting.
    ///
    /// Use [`BridgeClient::wait_for`] with the id, or [`BridgeClient::request`]
    /// when the answer may arrive before a later `wait_for` registers.
    pub fn issue(&self, code: CommandCode, payload: impl Into<Bytes>) -> Result<u32> {
        let id = self.next_id();
        self.send(CommandFrame::new(code, payload).with_id(id))?;
        Ok(id)
    }

    /// Register a one-shot waiter for `id` without sending anything.
    pub fn expect(&self, id: u32) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let reader = self.inner.readers.register(move |frame: &CommandFrame| {
            if frame.id != id {
                return false;
            }
            match slot.lock().take() {
                Some(tx) => {
                    let _ = tx.send(frame.clone());
                    true
                }
                None => false,
            }
        });
        PendingResponse {
            id,
            reader,
            readers: Arc::clone(&self.inner.readers),
            rx,
            timeout: self.inner.response_timeout,
        }
    }

    /// Wait for the response to an already issued id.
    pub async fn wait_for(&self, id: u32) -> Result<Bytes> {
        self.expect(id).wait().await
    }

    /// Issue a command and wait for its response.
    pub async fn request(&self, code: CommandCode, payload: impl Into<Bytes>) -> Result<Bytes> {
        let id = self.next_id();
        let pending = self.expect(id);
        self.send(CommandFrame::new(code, payload).with_id(id))?;
        pending.wait().await
    }

    /// Ask the gateway to join the overlay network.
    pub fn connect_overlay(&self) -> Result<()> {
        self.notify(CommandCode::Connect, Bytes::new())
    }

    pub fn disconnect(&self) -> Result<()> {
        self.notify(CommandCode::Disconnect, Bytes::new())
    }

    /// Ask the gateway to dial `peer`.
    pub fn connect_to_peer(&self, peer: &str) -> Result<()> {
        self.notify(CommandCode::ConnectToPeer, peer.to_string())
    }

    /// Ask the gateway to open an API session with `peer`.
    pub fn new_api_client(&self, peer: &str) -> Result<ApiClient> {
        self.notify(CommandCode::NewApiClient, peer.to_string())?;
        Ok(ApiClient::bind(self.clone(), peer))
    }

    /// Subscribe to `stream` on `peer` and route its pushes to `on_data`.
    ///
    /// Pushes are matched on the stream name before the first `/`. The reader
    /// stays installed until removed with [`BridgeClient::remove_reader`].
    ///
    /// Push readers observe frames without consuming them, so every
    /// subscription to the same stream name sees each push.
    pub fn subscribe<F>(&self, peer: &str, stream: &str, on_data: F) -> Result<ReaderId>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        let payload = encode_subscribe(peer, stream)?;
        let wanted = stream.split('/').next().unwrap_or(stream).to_string();
        let reader = self.inner.readers.register(move |frame: &CommandFrame| {
            if !frame.is_push() || stream_name_of(&frame.payload) != Some(wanted.as_str()) {
                return false;
            }
            on_data(frame.payload.clone());
            false
        });
        if let Err(err) = self.notify(CommandCode::Subscribe, payload) {
            self.inner.readers.unregister(reader);
            return Err(err);
        }
        Ok(reader)
    }

    /// Install a custom inbound reader.
    pub fn add_reader<F>(&self, reader: F) -> ReaderId
    where
        F: Fn(&CommandFrame) -> bool + Send + Sync + 'static,
    {
        self.inner.readers.register(reader)
    }

    pub fn remove_reader(&self, id: ReaderId) -> bool {
        self.inner.readers.unregister(id)
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("readers", &self.inner.readers.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumes acks of fire-and-forget commands so they don't go unhandled.
fn log_uncorrelated_reply(frame: &CommandFrame) -> bool {
    if frame.id != 0 || frame.is_push() {
        return false;
    }
    match frame.error_message() {
        Some(message) => tracing::warn!(command = %frame.code, %message, "gateway reported error"),
        None => tracing::debug!(
            command = %frame.code,
            reply = %String::from_utf8_lossy(&frame.payload),
            "gateway acknowledged"
        ),
    }
    true
}

/// A registered wait for one correlation id.
///
/// The reader is removed when the wait completes, times out or the value is
/// dropped.
pub struct PendingResponse {
    id: u32,
    reader: ReaderId,
    readers: Arc<ReaderRegistry>,
    rx: oneshot::Receiver<CommandFrame>,
    timeout: Duration,
}

impl PendingResponse {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wait for the matching frame; error frames become [`ClientError::Remote`].
    pub async fn wait(mut self) -> Result<Bytes> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(frame)) => frame.into_result().map_err(ClientError::Remote),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.readers.unregister(self.reader);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn test_client() -> (BridgeClient, mpsc::UnboundedReceiver<CommandFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = BridgeClient::from_parts(
            tx,
            Arc::new(ReaderRegistry::new()),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        (client, rx)
    }

    /// Answer every correlated frame through the client's own registry.
    fn spawn_responder(
        client: &BridgeClient,
        mut rx: mpsc::UnboundedReceiver<CommandFrame>,
        answer: fn(&CommandFrame) -> CommandFrame,
    ) -> tokio::task::JoinHandle<()> {
        let readers = Arc::clone(client.readers());
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                readers.dispatch(&answer(&frame));
            }
        })
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let (client, mut rx) = test_client();
        let first = client.issue(CommandCode::Connect, Bytes::new()).unwrap();
        let second = client.issue(CommandCode::Connect, Bytes::new()).unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(rx.try_recv().unwrap().id, 1);
        assert_eq!(rx.try_recv().unwrap().id, 2);
    }

    #[test]
    fn id_counter_skips_zero_on_wrap() {
        let (client, _rx) = test_client();
        client.inner.next_id.store(u32::MAX - 1, Ordering::Relaxed);
        assert_eq!(client.next_id(), u32::MAX);
        assert_eq!(client.next_id(), 1);
    }

    #[tokio::test]
    async fn concurrent_issue_yields_distinct_ids() {
        let (client, _rx) = test_client();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                (0..100)
                    .map(|_| client.issue(CommandCode::SendToPeerApi, Bytes::new()).unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            let ids = task.await.expect("issuer task should finish");
            assert!(
                ids.windows(2).all(|pair| pair[0] < pair[1]),
                "ids of one issuer must increase in issue order"
            );
            for id in ids {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen, (1..=1600).collect::<HashSet<u32>>());
    }

    #[tokio::test]
    async fn request_resolves_with_payload() {
        let (client, rx) = test_client();
        let baseline = client.readers().len();
        spawn_responder(&client, rx, |frame| frame.reply(&b"pong"[..]));

        let answer = client
            .request(CommandCode::SendToPeerApi, &b"ping"[..])
            .await
            .expect("request should be answered");
        assert_eq!(answer.as_ref(), b"pong");
        assert_eq!(client.readers().len(), baseline);
    }

    #[tokio::test]
    async fn error_frame_becomes_remote_error() {
        let (client, rx) = test_client();
        spawn_responder(&client, rx, |frame| frame.reply_error("unknown peer"));

        let err = client
            .request(CommandCode::SendToPeerApi, &b"x"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Remote(ref message) if message == "unknown peer"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_and_cleans_up() {
        let (client, _rx) = test_client();
        let baseline = client.readers().len();

        let id = client.issue(CommandCode::SendToPeerApi, Bytes::new()).unwrap();
        let err = client.wait_for(id).await.unwrap_err();

        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_secs(5)));
        assert_eq!(client.readers().len(), baseline);
    }

    #[tokio::test]
    async fn waiter_fires_once() {
        let (client, _rx) = test_client();
        let pending = client.expect(42);

        let reply = CommandFrame::new(CommandCode::SendToPeerApi, &b"first"[..]).with_id(42);
        assert!(client.readers().dispatch(&reply));
        let duplicate = CommandFrame::new(CommandCode::SendToPeerApi, &b"second"[..]).with_id(42);
        assert!(!client.readers().dispatch(&duplicate));

        assert_eq!(pending.wait().await.unwrap().as_ref(), b"first");
    }

    #[test]
    fn dropping_pending_unregisters() {
        let (client, _rx) = test_client();
        let baseline = client.readers().len();
        let pending = client.expect(7);
        assert_eq!(client.readers().len(), baseline + 1);
        drop(pending);
        assert_eq!(client.readers().len(), baseline);
    }

    #[test]
    fn fire_and_forget_commands_use_id_zero() {
        let (client, mut rx) = test_client();
        client.connect_overlay().unwrap();
        client.connect_to_peer("peer123").unwrap();
        let api = client.new_api_client("peer123").unwrap();
        assert_eq!(api.address(), "peer123");

        let frames: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let codes: Vec<_> = frames.iter().map(|frame| frame.code).collect();
        assert_eq!(
            codes,
            [CommandCode::Connect, CommandCode::ConnectToPeer, CommandCode::NewApiClient]
        );
        assert!(frames.iter().all(|frame| frame.id == 0));
        assert_eq!(frames[1].payload.as_ref(), b"peer123");
    }

    #[test]
    fn subscribe_routes_matching_pushes() {
        let (client, mut rx) = test_client();
        let received = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&received);
        let reader = client
            .subscribe("peer1", "news", move |data| {
                assert!(data.starts_with(b"news/"));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let request = rx.try_recv().unwrap();
        assert_eq!(request.code, CommandCode::Subscribe);
        assert_eq!(request.payload.as_ref(), b"peer1,news");

        client.readers().dispatch(&CommandFrame::push(&b"news/1"[..]));
        client.readers().dispatch(&CommandFrame::push(&b"weather/1"[..]));
        assert_eq!(received.load(Ordering::SeqCst), 1);

        assert!(client.remove_reader(reader));
        client.readers().dispatch(&CommandFrame::push(&b"news/2"[..]));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_subscription_to_a_stream_sees_each_push() {
        let (client, _rx) = test_client();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        client
            .subscribe("peerA", "news", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let counter = Arc::clone(&second);
        client
            .subscribe("peerB", "news/96", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..3 {
            client.readers().dispatch(&CommandFrame::push(&b"news/1"[..]));
        }
        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_subscribe_ack_is_consumed() {
        let (client, _rx) = test_client();
        client.subscribe("peer1", "news", |_| {}).unwrap();

        let ack = CommandFrame::new(CommandCode::Subscribe, Bytes::new());
        assert!(!ack.is_push());
        assert!(client.readers().dispatch(&ack));
    }

    #[test]
    fn closed_client_rejects_sends() {
        let (client, _rx) = test_client();
        client.close();
        assert!(matches!(
            client.issue(CommandCode::Connect, Bytes::new()),
            Err(ClientError::Disconnected)
        ));
    }
}
