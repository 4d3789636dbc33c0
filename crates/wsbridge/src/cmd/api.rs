use wsbridge_frame::CommandCode;

use crate::cmd::{connect_client, parse_duration, resolve_payload, ApiArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat, PayloadKind};

pub async fn run(args: ApiArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(args.data.as_deref(), args.file.as_deref())?;

    let client = connect_client(&args.url, timeout).await?;

    let confirmation = client
        .request(CommandCode::NewApiClient, args.peer.clone())
        .await
        .map_err(|err| client_error("new api client failed", err))?;
    tracing::info!(
        peer = %args.peer,
        reply = %String::from_utf8_lossy(&confirmation),
        "api session ready"
    );

    let api = wsbridge_client::ApiClient::bind(client.clone(), &args.peer);
    let answer = api
        .request(&args.command, &payload)
        .await
        .map_err(|err| {
            let context = format!("{} on {} failed", args.command, args.peer);
            client_error(&context, err)
        })?;
    print_payload(
        PayloadKind::Reply,
        CommandCode::SendToPeerApi,
        Some(api.address()),
        &answer,
        format,
    );

    client.shutdown().await;
    Ok(SUCCESS)
}
