use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use wsbridge_transport::{read_frame, FrameSink, Inbound};

use crate::error::{Result, ServerError};
use crate::gateway::Gateway;

/// Bind the gateway's TCP listener.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Accept WebSocket clients until `shutdown` fires.
///
/// Every connection is served on its own task; frames from one connection
/// are handled in arrival order.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "gateway listening");

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, remote_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };

        let gateway = Arc::clone(&gateway);
        let shutdown = shutdown.child_token();
        tokio::spawn(async move {
            handle_connection(stream, remote_addr, gateway, shutdown).await;
        });
    }

    tracing::info!(addr = %local_addr, "gateway stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
) {
    let (conn, mut messages) = match wsbridge_transport::accept(stream).await {
        Ok(accepted) => accepted,
        Err(err) => {
            tracing::warn!(%remote_addr, error = %err, "websocket upgrade failed");
            return;
        }
    };
    let sink: Arc<dyn FrameSink> = conn.clone();
    let conn_id = sink.id();
    tracing::info!(conn = %conn_id, %remote_addr, "client connected");

    let max_payload = gateway.config().max_payload_size;
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = conn.close().await;
                break;
            }
            message = messages.next() => message,
        };

        match message {
            Some(Ok(message)) => match read_frame(message, max_payload) {
                Ok(Inbound::Frame(frame)) => gateway.handle_frame(&sink, frame).await,
                Ok(Inbound::Control) => {}
                Ok(Inbound::Close) => break,
                Err(err) => {
                    tracing::warn!(conn = %conn_id, error = %err, "dropping undecodable message")
                }
            },
            Some(Err(err)) => {
                tracing::debug!(conn = %conn_id, error = %err, "read failed");
                break;
            }
            None => break,
        }
    }

    let removed = gateway.streams().unsubscribe_connection(conn_id);
    tracing::info!(conn = %conn_id, %remote_addr, subscriptions = removed, "client disconnected");
}
