use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use wsbridge_frame::CommandFrame;
use wsbridge_transport::{read_frame, Connection, FrameSink, Inbound, MessageStream};

use crate::client::{BridgeClient, Inner};
use crate::config::ReconnectHandler;
use crate::readers::ReaderRegistry;

/// Everything the background connection task owns.
pub(crate) struct Session {
    pub url: String,
    pub reconnect_delay: Duration,
    pub max_payload: usize,
    pub readers: Arc<ReaderRegistry>,
    pub outbound: mpsc::UnboundedReceiver<CommandFrame>,
    pub client: Weak<Inner>,
    pub on_reconnected: Option<ReconnectHandler>,
    pub ready: Option<oneshot::Sender<()>>,
    pub shutdown: CancellationToken,
}

enum Stop {
    /// The client is gone or closed.
    Shutdown,
    /// The connection dropped; try again.
    Lost,
}

/// Keep one gateway connection alive until shutdown.
///
/// Inbound frames go to the reader registry. After a lost connection the
/// task waits `reconnect_delay`, drops whatever was queued meanwhile, and
/// dials again. Every reconnect after the first runs `on_reconnected`.
pub(crate) async fn run(mut session: Session) {
    let mut connected_before = false;

    loop {
        let dial = tokio::select! {
            _ = session.shutdown.cancelled() => break,
            result = wsbridge_transport::connect(&session.url) => result,
        };

        match dial {
            Ok((conn, messages)) => {
                tracing::info!(url = %session.url, "connected to gateway");
                if connected_before {
                    session.notify_reconnected();
                } else {
                    connected_before = true;
                    if let Some(ready) = session.ready.take() {
                        let _ = ready.send(());
                    }
                }

                let stop = pump(&mut session, &conn, messages).await;
                if let Stop::Shutdown = stop {
                    session.flush(&conn).await;
                    let _ = conn.close().await;
                    break;
                }
                tracing::warn!(url = %session.url, "gateway connection lost");
            }
            Err(err) => {
                tracing::warn!(url = %session.url, error = %err, "gateway connection failed");
            }
        }

        tokio::select! {
            _ = session.shutdown.cancelled() => break,
            _ = tokio::time::sleep(session.reconnect_delay) => {}
        }
        session.drop_queued();
    }

    tracing::debug!(url = %session.url, "session stopped");
}

impl Session {
    fn notify_reconnected(&self) {
        let Some(handler) = &self.on_reconnected else {
            return;
        };
        if let Some(inner) = self.client.upgrade() {
            handler(&BridgeClient { inner });
        }
    }

    /// Write whatever is still queued; used on shutdown.
    async fn flush(&mut self, conn: &Connection) {
        while let Ok(frame) = self.outbound.try_recv() {
            if let Err(err) = conn.send_frame(&frame).await {
                tracing::warn!(id = frame.id, error = %err, "failed to flush frame");
                break;
            }
        }
    }

    fn drop_queued(&mut self) {
        let mut dropped = 0usize;
        while let Ok(frame) = self.outbound.try_recv() {
            tracing::warn!(id = frame.id, command = %frame.code, "not connected, dropping frame");
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "discarded frames queued while disconnected");
        }
    }
}

async fn pump(session: &mut Session, conn: &Connection, mut messages: MessageStream) -> Stop {
    loop {
        tokio::select! {
            _ = session.shutdown.cancelled() => return Stop::Shutdown,
            outbound = session.outbound.recv() => {
                let Some(frame) = outbound else {
                    return Stop::Shutdown;
                };
                if let Err(err) = conn.send_frame(&frame).await {
                    tracing::warn!(id = frame.id, error = %err, "failed to send frame");
                    return Stop::Lost;
                }
            }
            inbound = messages.next() => match inbound {
                Some(Ok(message)) => match read_frame(message, session.max_payload) {
                    Ok(Inbound::Frame(frame)) => {
                        tracing::trace!(id = frame.id, command = %frame.code, "frame received");
                        if !session.readers.dispatch(&frame) && !frame.is_push() {
                            tracing::debug!(id = frame.id, command = %frame.code, "no reader for frame");
                        }
                    }
                    Ok(Inbound::Control) => {}
                    Ok(Inbound::Close) => return Stop::Lost,
                    Err(err) => tracing::warn!(error = %err, "dropping undecodable message"),
                },
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "gateway read failed");
                    return Stop::Lost;
                }
                None => return Stop::Lost,
            },
        }
    }
}
