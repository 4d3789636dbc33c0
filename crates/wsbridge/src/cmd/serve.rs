use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wsbridge_server::{bind, serve, Gateway, MemoryOverlay, MemoryPeer, ServerConfig};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{server_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let config = ServerConfig {
        listen_addr: args.listen,
        api_timeout: parse_duration(&args.api_timeout)?,
        ..ServerConfig::default()
    };
    let stream_interval = parse_duration(&args.stream_interval)?;

    let overlay = Arc::new(MemoryOverlay::new());
    for peer in &args.peers {
        overlay.add_peer(MemoryPeer::echo(peer.as_str()));
    }

    let gateway = Gateway::start(overlay.clone(), config.clone())
        .await
        .map_err(|err| server_error("gateway start failed", err))?;
    let listener = bind(config.listen_addr)
        .await
        .map_err(|err| server_error("bind failed", err))?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    if let Some(stream) = args.stream {
        tokio::spawn(publish(
            overlay,
            args.peers,
            stream,
            stream_interval,
            shutdown.clone(),
        ));
    }

    serve(listener, gateway, shutdown)
        .await
        .map_err(|err| server_error("serve failed", err))?;
    Ok(SUCCESS)
}

pub(crate) fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "signal handler setup failed");
            return;
        }
        tracing::info!("interrupt received, shutting down");
        shutdown.cancel();
    });
}

/// Push `<stream>/<n>` from every peer until shutdown.
async fn publish(
    overlay: Arc<MemoryOverlay>,
    peers: Vec<String>,
    stream: String,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        sequence += 1;
        let packet = format!("{stream}/{sequence}");
        for peer in &peers {
            overlay.push(peer, packet.as_bytes());
        }
    }
}
