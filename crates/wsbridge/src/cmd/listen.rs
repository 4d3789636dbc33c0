use tokio::sync::mpsc;
use wsbridge_frame::CommandCode;

use crate::cmd::{connect_client, parse_duration, serve::spawn_signal_handler, ListenArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat, PayloadKind};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let client = connect_client(&args.url, timeout).await?;

    let (packets, mut packet_rx) = mpsc::unbounded_channel();
    client
        .subscribe(&args.peer, &args.stream, move |data| {
            let _ = packets.send(data);
        })
        .map_err(|err| client_error("subscribe failed", err))?;
    tracing::info!(peer = %args.peer, stream = %args.stream, "listening for stream data");

    let shutdown = tokio_util::sync::CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let mut printed = 0usize;
    loop {
        let data = tokio::select! {
            _ = shutdown.cancelled() => break,
            data = packet_rx.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        print_payload(
            PayloadKind::Push,
            CommandCode::Subscribe,
            Some(&args.peer),
            &data,
            format,
        );
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    client.shutdown().await;
    Ok(SUCCESS)
}
