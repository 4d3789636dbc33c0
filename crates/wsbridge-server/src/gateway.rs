use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use wsbridge_frame::{
    decode_text, parse_api_request, parse_subscribe, stream_name_of, CommandCode, CommandFrame,
    FrameError,
};
use wsbridge_transport::FrameSink;

use crate::api_clients::ApiClientRegistry;
use crate::config::ServerConfig;
use crate::error::{DispatchError, OverlayError, Result, ServerError};
use crate::overlay::{Overlay, PacketHandler};
use crate::streams::{stream_key, StreamTable};

/// Confirmation sent for `Connect`.
pub const CONNECTED_REPLY: &str = "connected to overlay network";

/// Result of dispatching one command.
enum Outcome {
    /// Answer right away.
    Reply(Bytes),
    /// Answer once the peer does.
    Relay {
        peer: String,
        answer: oneshot::Receiver<std::result::Result<Bytes, OverlayError>>,
    },
}

/// The gateway: one overlay client shared by every WebSocket connection.
pub struct Gateway {
    overlay: Arc<dyn Overlay>,
    api_clients: ApiClientRegistry,
    streams: Arc<StreamTable>,
    config: ServerConfig,
}

impl Gateway {
    /// Connect to the overlay network and start routing its packets.
    ///
    /// Fails when the overlay cannot be reached; no connection should be
    /// accepted in that case.
    pub async fn start(overlay: Arc<dyn Overlay>, config: ServerConfig) -> Result<Arc<Self>> {
        let streams = Arc::new(StreamTable::with_queue_capacity(config.push_queue_size));

        let routing = Arc::clone(&streams);
        let on_packet: PacketHandler = Arc::new(move |peer: &str, data: &[u8]| {
            let Some(stream) = stream_name_of(data) else {
                return false;
            };
            if !routing.has_subscribers(peer, stream) {
                return false;
            }
            tracing::trace!(peer, stream, len = data.len(), "packet for subscribed stream");
            routing.deliver(peer, stream, Bytes::copy_from_slice(data)) > 0
        });

        overlay
            .connect(on_packet)
            .await
            .map_err(ServerError::OverlayConnect)?;
        tracing::info!("connected to overlay network");

        Ok(Arc::new(Self {
            api_clients: ApiClientRegistry::new(Arc::clone(&overlay)),
            overlay,
            streams,
            config,
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn streams(&self) -> &Arc<StreamTable> {
        &self.streams
    }

    pub fn api_clients(&self) -> &ApiClientRegistry {
        &self.api_clients
    }

    /// Handle one inbound text message. Undecodable messages are dropped.
    pub async fn handle_text(&self, conn: &Arc<dyn FrameSink>, text: &str) {
        match decode_text(text, self.config.max_payload_size) {
            Ok(frame) => self.handle_frame(conn, frame).await,
            Err(err) => {
                tracing::warn!(conn = %conn.id(), error = %err, "dropping undecodable message")
            }
        }
    }

    /// Dispatch one frame and write its answer with the same id and command.
    ///
    /// `SendToPeerAPI` answers are awaited on a separate task so later frames
    /// on the connection are not held up.
    pub async fn handle_frame(&self, conn: &Arc<dyn FrameSink>, frame: CommandFrame) {
        tracing::info!(
            conn = %conn.id(),
            id = frame.id,
            command = %frame.code,
            len = frame.payload.len(),
            "command received"
        );

        let reply = match self.dispatch(conn, &frame).await {
            Ok(Outcome::Reply(payload)) => frame.reply(payload),
            Ok(Outcome::Relay { peer, answer }) => {
                let conn = Arc::clone(conn);
                let timeout = self.config.api_timeout;
                tokio::spawn(async move {
                    let reply = match tokio::time::timeout(timeout, answer).await {
                        Ok(Ok(Ok(data))) => frame.reply(data),
                        Ok(Ok(Err(OverlayError::Api(message)))) => {
                            frame.reply_error(DispatchError::Api { peer, message })
                        }
                        Ok(Ok(Err(source))) => {
                            frame.reply_error(DispatchError::ApiSession { peer, source })
                        }
                        Ok(Err(_)) => frame.reply_error(DispatchError::Abandoned(peer)),
                        Err(_) => frame.reply_error(DispatchError::Timeout { peer, timeout }),
                    };
                    write_reply(conn.as_ref(), &reply).await;
                });
                return;
            }
            Err(err) => {
                tracing::warn!(
                    conn = %conn.id(),
                    id = frame.id,
                    command = %frame.code,
                    error = %err,
                    "command failed"
                );
                frame.reply_error(err)
            }
        };
        write_reply(conn.as_ref(), &reply).await;
    }

    async fn dispatch(
        &self,
        conn: &Arc<dyn FrameSink>,
        frame: &CommandFrame,
    ) -> std::result::Result<Outcome, DispatchError> {
        match frame.code {
            CommandCode::Connect => Ok(Outcome::Reply(Bytes::from_static(
                CONNECTED_REPLY.as_bytes(),
            ))),

            CommandCode::Disconnect => Ok(Outcome::Reply(Bytes::new())),

            CommandCode::ConnectToPeer => {
                let peer = peer_address(&frame.payload)?;
                self.overlay
                    .connect_to_peer(peer)
                    .await
                    .map_err(|source| DispatchError::PeerConnect {
                        peer: peer.to_string(),
                        source,
                    })?;
                tracing::info!(peer, "connected to peer");
                Ok(Outcome::Reply(Bytes::from(format!("connected to peer {peer}"))))
            }

            CommandCode::NewApiClient => {
                let peer = peer_address(&frame.payload)?;
                self.api_clients
                    .get_or_create(peer)
                    .await
                    .map_err(|source| DispatchError::ApiSession {
                        peer: peer.to_string(),
                        source,
                    })?;
                tracing::info!(peer, "connected to peer api");
                Ok(Outcome::Reply(Bytes::from(format!("connected to peer {peer} api"))))
            }

            CommandCode::SendToPeerApi => {
                let request = parse_api_request(&frame.payload)?;
                let session = self
                    .api_clients
                    .get(request.peer)
                    .await
                    .ok_or_else(|| DispatchError::UnknownPeer(request.peer.to_string()))?;

                tracing::debug!(
                    peer = request.peer,
                    api_command = request.command,
                    len = request.data.len(),
                    "relaying api command"
                );
                let (tx, answer) = oneshot::channel();
                session.send(
                    request.command,
                    frame.payload.slice_ref(request.data),
                    Box::new(move |result: std::result::Result<Bytes, OverlayError>| {
                        let _ = tx.send(result);
                    }),
                );
                Ok(Outcome::Relay {
                    peer: request.peer.to_string(),
                    answer,
                })
            }

            CommandCode::Subscribe => {
                let target = parse_subscribe(&frame.payload)?;
                let stream = stream_key(target.stream);
                if self.streams.subscribe(target.peer, stream, Arc::clone(conn)) {
                    tracing::info!(
                        conn = %conn.id(),
                        peer = target.peer,
                        stream,
                        "stream subscribed"
                    );
                }
                Ok(Outcome::Reply(Bytes::new()))
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("streams", &self.streams)
            .field("config", &self.config)
            .finish()
    }
}

fn peer_address(payload: &[u8]) -> std::result::Result<&str, FrameError> {
    let invalid = |reason: &str| FrameError::InvalidPayload {
        kind: "peer address",
        reason: reason.to_string(),
    };
    let address = std::str::from_utf8(payload).map_err(|_| invalid("not valid UTF-8"))?;
    if address.is_empty() {
        return Err(invalid("empty"));
    }
    Ok(address)
}

async fn write_reply(conn: &dyn FrameSink, reply: &CommandFrame) {
    if let Err(err) = conn.send_frame(reply).await {
        tracing::warn!(conn = %conn.id(), id = reply.id, error = %err, "failed to write reply");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wsbridge_frame::encode_text;

    use super::*;
    use crate::overlay::{MemoryOverlay, MemoryPeer};
    use crate::streams::tests::{RecordingSink, StalledSink};

    async fn gateway_with(overlay: Arc<MemoryOverlay>) -> Arc<Gateway> {
        Gateway::start(overlay, ServerConfig::default())
            .await
            .expect("gateway should start")
    }

    fn default_overlay() -> Arc<MemoryOverlay> {
        Arc::new(
            MemoryOverlay::new()
                .with_peer(MemoryPeer::echo("peer123"))
                .with_peer(MemoryPeer::echo("quiet").silent()),
        )
    }

    fn sink() -> (Arc<RecordingSink>, Arc<dyn FrameSink>) {
        let recording = RecordingSink::new();
        let conn: Arc<dyn FrameSink> = recording.clone();
        (recording, conn)
    }

    async fn next_reply(recording: &RecordingSink) -> CommandFrame {
        for _ in 0..200 {
            if let Some(frame) = recording.frames.lock().pop() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no reply written");
    }

    #[tokio::test]
    async fn offline_overlay_prevents_start() {
        let err = Gateway::start(Arc::new(MemoryOverlay::offline()), ServerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::OverlayConnect(_)));
    }

    #[tokio::test]
    async fn connect_confirms_readiness() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        gateway
            .handle_frame(&conn, CommandFrame::new(CommandCode::Connect, Bytes::new()).with_id(1))
            .await;

        let reply = next_reply(&recording).await;
        assert_eq!((reply.id, reply.is_error), (1, false));
        assert_eq!(reply.payload.as_ref(), CONNECTED_REPLY.as_bytes());
    }

    #[tokio::test]
    async fn disconnect_succeeds() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        gateway
            .handle_frame(&conn, CommandFrame::new(CommandCode::Disconnect, Bytes::new()))
            .await;
        assert!(!next_reply(&recording).await.is_error);
    }

    #[tokio::test]
    async fn connect_to_peer_confirms_address() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        let request = CommandFrame::new(CommandCode::ConnectToPeer, &b"peer123"[..]).with_id(4);
        gateway.handle_frame(&conn, request).await;

        let reply = next_reply(&recording).await;
        assert!(!reply.is_error);
        assert_eq!(reply.id, 4);
        assert!(String::from_utf8_lossy(&reply.payload).contains("peer123"));
    }

    #[tokio::test]
    async fn connect_to_unknown_peer_is_error_frame() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        let request = CommandFrame::new(CommandCode::ConnectToPeer, &b"ghost"[..]).with_id(5);
        gateway.handle_frame(&conn, request).await;

        let reply = next_reply(&recording).await;
        assert!(reply.is_error);
        assert_eq!(reply.id, 5);
        assert!(reply.error_message().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn api_send_before_new_api_client_is_unknown_peer() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        let request =
            CommandFrame::new(CommandCode::SendToPeerApi, &b"peer123,echo,hello"[..]).with_id(9);
        gateway.handle_frame(&conn, request).await;

        let reply = next_reply(&recording).await;
        assert!(reply.is_error);
        assert_eq!((reply.id, reply.code), (9, CommandCode::SendToPeerApi));
        assert!(reply.error_message().unwrap().contains("peer123"));
    }

    #[tokio::test]
    async fn api_send_relays_data_with_commas() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        gateway
            .handle_frame(&conn, CommandFrame::new(CommandCode::NewApiClient, &b"peer123"[..]))
            .await;
        assert!(!next_reply(&recording).await.is_error);

        let request =
            CommandFrame::new(CommandCode::SendToPeerApi, &b"peer123,echo,a,b,c"[..]).with_id(10);
        gateway.handle_frame(&conn, request).await;

        let reply = next_reply(&recording).await;
        assert_eq!((reply.id, reply.is_error), (10, false));
        assert_eq!(reply.payload.as_ref(), b"a,b,c");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        gateway
            .handle_frame(&conn, CommandFrame::new(CommandCode::NewApiClient, &b"quiet"[..]))
            .await;
        next_reply(&recording).await;

        let request =
            CommandFrame::new(CommandCode::SendToPeerApi, &b"quiet,echo,x"[..]).with_id(11);
        gateway.handle_frame(&conn, request).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let reply = next_reply(&recording).await;
        assert!(reply.is_error);
        assert_eq!(reply.id, 11);
        assert!(reply.error_message().unwrap().contains("did not answer"));
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        gateway.handle_text(&conn, "not base64!").await;
        let mut corrupted = CommandFrame::new(CommandCode::Connect, Bytes::new())
            .encode()
            .to_vec();
        corrupted[0] ^= 1;
        gateway.handle_text(&conn, &base64_of(&corrupted)).await;
        assert!(recording.received().is_empty());

        let valid = CommandFrame::new(CommandCode::Connect, Bytes::new()).with_id(2);
        gateway.handle_text(&conn, &encode_text(&valid)).await;
        assert_eq!(next_reply(&recording).await.id, 2);
    }

    fn base64_of(data: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[tokio::test]
    async fn subscribe_then_push_reaches_connection() {
        let overlay = default_overlay();
        let gateway = gateway_with(overlay.clone()).await;
        let (recording, conn) = sink();

        let request = CommandFrame::new(CommandCode::Subscribe, &b"peer123,news/96"[..]);
        gateway.handle_frame(&conn, request).await;
        next_reply(&recording).await;
        assert!(gateway.streams().has_subscribers("peer123", "news"));

        assert!(overlay.push("peer123", b"news/today"));
        assert!(!overlay.push("peer123", b"weather/today"));
        assert!(!overlay.push("other", b"news/today"));

        let push = next_reply(&recording).await;
        assert!(push.is_push());
        assert_eq!(push.payload.as_ref(), b"news/today");
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_block_other_streams() {
        let overlay = default_overlay();
        let gateway = gateway_with(overlay.clone()).await;
        let stalled: Arc<dyn FrameSink> = StalledSink::new();
        let (recording, conn) = sink();

        gateway.streams().subscribe("peer123", "video", stalled);
        let request = CommandFrame::new(CommandCode::Subscribe, &b"peer123,news"[..]);
        gateway.handle_frame(&conn, request).await;
        next_reply(&recording).await;

        for _ in 0..200 {
            overlay.push("peer123", b"video/1");
        }
        assert!(overlay.push("peer123", b"news/1"));

        let push = next_reply(&recording).await;
        assert!(push.is_push());
        assert_eq!(push.payload.as_ref(), b"news/1");
    }

    #[tokio::test]
    async fn bad_subscribe_payload_is_error_frame() {
        let gateway = gateway_with(default_overlay()).await;
        let (recording, conn) = sink();

        let request = CommandFrame::new(CommandCode::Subscribe, &b"no-comma"[..]).with_id(3);
        gateway.handle_frame(&conn, request).await;

        let reply = next_reply(&recording).await;
        assert!(reply.is_error);
        assert_eq!(reply.id, 3);
        assert!(gateway.streams().is_empty());
    }
}
