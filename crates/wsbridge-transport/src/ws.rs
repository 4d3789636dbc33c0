use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use wsbridge_frame::{decode_text, encode_text, CommandFrame};

use crate::error::{Result, TransportError};
use crate::traits::{ConnectionId, FrameSink};

type BoxedSink = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

/// Read half of a WebSocket connection.
pub type MessageStream = Pin<Box<dyn Stream<Item = tungstenite::Result<Message>> + Send>>;

/// Write half of a WebSocket connection, shared between tasks.
///
/// All writes go through one async mutex so frames never interleave.
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    writer: Mutex<BoxedSink>,
}

impl Connection {
    /// Wrap any message sink.
    pub fn new<S>(sink: S, peer_addr: Option<SocketAddr>) -> Self
    where
        S: Sink<Message, Error = tungstenite::Error> + Send + 'static,
    {
        Self {
            id: ConnectionId::new(),
            peer_addr,
            writer: Mutex::new(Box::pin(sink)),
        }
    }

    /// Remote address, when known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Write one text message.
    pub async fn send_text(&self, text: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(Message::text(text)).await?;
        Ok(())
    }

    /// Send a close message and flush.
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl FrameSink for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_frame(&self, frame: &CommandFrame) -> Result<()> {
        self.send_text(encode_text(frame)).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// What one inbound WebSocket message turned out to be.
#[derive(Debug)]
pub enum Inbound {
    /// A text message carrying a valid frame.
    Frame(CommandFrame),
    /// Ping/pong or other transport-level traffic.
    Control,
    /// The peer sent a close message.
    Close,
}

/// Classify one inbound message and decode its frame.
pub fn read_frame(message: Message, max_payload: usize) -> Result<Inbound> {
    match message {
        Message::Text(text) => Ok(Inbound::Frame(decode_text(text.as_str(), max_payload)?)),
        Message::Binary(data) => Err(TransportError::BinaryMessage(data.len())),
        Message::Close(_) => Ok(Inbound::Close),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Control),
    }
}

/// Split an established WebSocket into a shared writer and a read stream.
pub fn split<S>(
    ws: WebSocketStream<S>,
    peer_addr: Option<SocketAddr>,
) -> (Arc<Connection>, MessageStream)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    (Arc::new(Connection::new(sink, peer_addr)), Box::pin(stream))
}

/// Perform the server side of the HTTP upgrade on an accepted TCP stream.
pub async fn accept(stream: TcpStream) -> Result<(Arc<Connection>, MessageStream)> {
    let peer_addr = stream.peer_addr().ok();
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(TransportError::Handshake)?;
    Ok(split(ws, peer_addr))
}

/// Open a client connection to a `ws://` URL.
pub async fn connect(url: &str) -> Result<(Arc<Connection>, MessageStream)> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|source| TransportError::Connect {
            url: url.to_string(),
            source,
        })?;
    Ok(split(ws, None))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use bytes::Bytes;
    use tokio::net::TcpListener;
    use wsbridge_frame::{CommandCode, DEFAULT_MAX_PAYLOAD};

    use super::*;

    fn capturing_connection() -> (Connection, Arc<StdMutex<Vec<Message>>>) {
        let store = Arc::new(StdMutex::new(Vec::new()));
        let sink = futures_util::sink::unfold(
            Arc::clone(&store),
            |store, message: Message| async move {
                store.lock().unwrap().push(message);
                Ok::<_, tungstenite::Error>(store)
            },
        );
        (Connection::new(sink, None), store)
    }

    #[tokio::test]
    async fn send_frame_writes_base64_text() {
        let (conn, store) = capturing_connection();
        let frame = CommandFrame::new(CommandCode::Connect, Bytes::from_static(b"hi")).with_id(3);

        conn.send_frame(&frame).await.unwrap();

        let messages = store.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        match read_frame(messages[0].clone(), DEFAULT_MAX_PAYLOAD).unwrap() {
            Inbound::Frame(decoded) => assert_eq!(decoded, frame),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_writers_are_serialized() {
        let (conn, store) = capturing_connection();
        let conn = Arc::new(conn);

        let mut tasks = Vec::new();
        for id in 1..=32u32 {
            let conn = Arc::clone(&conn);
            tasks.push(tokio::spawn(async move {
                let frame = CommandFrame::new(CommandCode::SendToPeerApi, vec![id as u8; 64])
                    .with_id(id);
                conn.send_frame(&frame).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let messages = store.lock().unwrap().clone();
        let mut ids: Vec<u32> = messages
            .into_iter()
            .map(|message| match read_frame(message, DEFAULT_MAX_PAYLOAD).unwrap() {
                Inbound::Frame(frame) => frame.id,
                other => panic!("expected frame, got {other:?}"),
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failing_sink_surfaces_error() {
        let sink = futures_util::sink::unfold((), |_, _message: Message| async move {
            Err::<(), _>(tungstenite::Error::ConnectionClosed)
        });
        let conn = Connection::new(sink, None);

        let err = conn
            .send_frame(&CommandFrame::new(CommandCode::Connect, Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::WebSocket(_)));
    }

    #[test]
    fn read_frame_classifies_messages() {
        assert!(matches!(
            read_frame(Message::Binary(vec![1, 2, 3].into()), DEFAULT_MAX_PAYLOAD),
            Err(TransportError::BinaryMessage(3))
        ));
        assert!(matches!(
            read_frame(Message::Ping(Vec::new().into()), DEFAULT_MAX_PAYLOAD),
            Ok(Inbound::Control)
        ));
        assert!(matches!(
            read_frame(Message::Close(None), DEFAULT_MAX_PAYLOAD),
            Ok(Inbound::Close)
        ));
        assert!(matches!(
            read_frame(Message::text("@@@"), DEFAULT_MAX_PAYLOAD),
            Err(TransportError::Frame(_))
        ));
    }

    #[tokio::test]
    async fn accept_and_connect_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (conn, mut messages) = accept(stream).await.unwrap();
            assert!(conn.peer_addr().is_some());
            let message = messages.next().await.unwrap().unwrap();
            match read_frame(message, DEFAULT_MAX_PAYLOAD).unwrap() {
                Inbound::Frame(frame) => conn.send_frame(&frame.reply(&b"pong"[..])).await.unwrap(),
                other => panic!("expected frame, got {other:?}"),
            }
        });

        let (conn, mut messages) = connect(&format!("ws://{addr}/ws")).await.unwrap();
        let request = CommandFrame::new(CommandCode::Connect, &b"ping"[..]).with_id(7);
        conn.send_frame(&request).await.unwrap();

        let message = messages.next().await.unwrap().unwrap();
        match read_frame(message, DEFAULT_MAX_PAYLOAD).unwrap() {
            Inbound::Frame(frame) => {
                assert_eq!(frame.id, 7);
                assert_eq!(frame.payload.as_ref(), b"pong");
            }
            other => panic!("expected frame, got {other:?}"),
        }

        server.await.unwrap();
        let _ = conn.close().await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&format!("ws://{addr}/ws")).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
