use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wsbridge_frame::CommandCode;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Whether a printed payload answered a request or was pushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Reply,
    Push,
}

impl PayloadKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Push => "push",
        }
    }
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    kind: PayloadKind,
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_payload(
    kind: PayloadKind,
    command: CommandCode,
    peer: Option<&str>,
    payload: &[u8],
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                kind,
                command: command.name(),
                peer,
                payload_size: payload.len(),
                payload: payload_preview(payload),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "COMMAND", "PEER", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    kind.as_str().to_string(),
                    command.name().to_string(),
                    peer.unwrap_or("-").to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} command={} peer={} size={} payload={}",
                kind.as_str(),
                command.name(),
                peer.unwrap_or("-"),
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payload_preview() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xFF, 0xFE]), "<binary 2 bytes>");
    }

    #[test]
    fn json_output_shape() {
        let out = PayloadOutput {
            kind: PayloadKind::Push,
            command: CommandCode::Subscribe.name(),
            peer: None,
            payload_size: 6,
            payload: "news/1".into(),
            timestamp: "0".into(),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("\"kind\":\"push\""));
        assert!(json.contains("\"command\":\"SUBSCRIBE\""));
        assert!(!json.contains("peer"));
    }
}
