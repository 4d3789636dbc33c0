use wsbridge_frame::{CommandCode, CommandFrame};

use crate::cmd::{connect_client, parse_duration, resolve_payload, SendArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat, PayloadKind};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let code = CommandCode::from(args.command);
    let payload = resolve_payload(args.data.as_deref(), args.file.as_deref())?;

    let client = connect_client(&args.url, timeout).await?;

    if args.no_wait {
        client
            .send(CommandFrame::new(code, payload))
            .map_err(|err| client_error("send failed", err))?;
        client.shutdown().await;
        return Ok(SUCCESS);
    }

    let reply = client
        .request(code, payload)
        .await
        .map_err(|err| client_error(&format!("{} failed", code.name()), err))?;
    print_payload(PayloadKind::Reply, code, None, &reply, format);

    client.shutdown().await;
    Ok(SUCCESS)
}
