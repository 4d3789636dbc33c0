//! Diagnostics for the `wsbridge` binary.
//!
//! Logs go to stderr so stdout stays parseable. At `info` the gateway reports
//! connections, subscriptions and commands received; the client reports
//! (re)connects. Frame-level tracing lives at `debug`/`trace`. Dependencies
//! such as tungstenite are capped at `warn` whatever `--log-level` says.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const WSBRIDGE_TARGETS: [&str; 5] = [
    "wsbridge",
    "wsbridge_frame",
    "wsbridge_transport",
    "wsbridge_client",
    "wsbridge_server",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let level = LevelFilter::from(level);
    WSBRIDGE_TARGETS.iter().fold(
        Targets::new().with_default(LevelFilter::WARN.min(level)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Install the stderr subscriber.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::TRACE)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder
                .with_ansi(std::io::stderr().is_terminal())
                .finish()
                .with(targets(level))
                .try_init();
        }
        LogFormat::Json => {
            let _ = builder
                .with_ansi(false)
                .json()
                .finish()
                .with(targets(level))
                .try_init();
        }
    }
}
