use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use wsbridge_client::{ws_url_for, BridgeClient, ClientConfig};
use wsbridge_frame::CommandCode;

use crate::exit::{client_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod api;
pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a gateway over an in-process overlay network.
    Serve(ServeArgs),
    /// Send one command and print the reply.
    Send(SendArgs),
    /// Open an API session with a peer and relay one command to it.
    Api(ApiArgs),
    /// Subscribe to a peer stream and print pushed data.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Api(args) => api::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
    /// Echo peers to simulate (repeatable).
    #[arg(long = "peer", value_name = "ADDRESS", default_value = "peer123")]
    pub peers: Vec<String>,
    /// Make every peer push `<STREAM>/<n>` packets periodically.
    #[arg(long, value_name = "STREAM")]
    pub stream: Option<String>,
    /// Interval between pushed packets (e.g. 1s, 200ms).
    #[arg(long, default_value = "1s")]
    pub stream_interval: String,
    /// How long to wait for a peer's API answer.
    #[arg(long, default_value = "5s")]
    pub api_timeout: String,
}

/// Gateway commands selectable on the command line.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CommandArg {
    Connect,
    Disconnect,
    ConnectToPeer,
    NewApiClient,
    SendToPeerApi,
    Subscribe,
}

impl From<CommandArg> for CommandCode {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Connect => CommandCode::Connect,
            CommandArg::Disconnect => CommandCode::Disconnect,
            CommandArg::ConnectToPeer => CommandCode::ConnectToPeer,
            CommandArg::NewApiClient => CommandCode::NewApiClient,
            CommandArg::SendToPeerApi => CommandCode::SendToPeerApi,
            CommandArg::Subscribe => CommandCode::Subscribe,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Gateway URL (ws://, wss://, or the http(s) page URL it is served from).
    pub url: String,
    /// Command to send.
    pub command: CommandArg,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Send with id 0 and exit without waiting for the reply.
    #[arg(long)]
    pub no_wait: bool,
    /// Maximum time to wait for the connection and the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ApiArgs {
    /// Gateway URL.
    pub url: String,
    /// Peer address.
    pub peer: String,
    /// API command to run on the peer.
    pub command: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Gateway URL.
    pub url: String,
    /// Peer address.
    pub peer: String,
    /// Stream name, optionally with parameters (`name/params`).
    pub stream: String,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Accept a WebSocket URL as-is; derive one from an http(s) page URL.
pub(crate) fn resolve_url(input: &str) -> CliResult<String> {
    if input.starts_with("ws://") || input.starts_with("wss://") {
        return Ok(input.to_string());
    }
    ws_url_for(input).map_err(|err| client_error("invalid gateway url", err))
}

pub(crate) fn resolve_payload(data: Option<&str>, file: Option<&Path>) -> CliResult<Vec<u8>> {
    if let Some(data) = data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Connect a client with every timeout set to `timeout`.
pub(crate) async fn connect_client(url: &str, timeout: Duration) -> CliResult<BridgeClient> {
    let config = ClientConfig {
        response_timeout: timeout,
        connect_timeout: timeout,
        ..ClientConfig::new(resolve_url(url)?)
    };
    BridgeClient::connect(config)
        .await
        .map_err(|err| client_error("connect failed", err))
}
