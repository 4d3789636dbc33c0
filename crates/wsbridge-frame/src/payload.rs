//! Comma-separated command payloads.
//!
//! Only the leading fields are significant. Raw data after the last field may
//! contain any byte, commas included, so fields are split positionally.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

const FIELD_SEPARATOR: u8 = b',';
const STREAM_PARAMS_SEPARATOR: u8 = b'/';

/// `SendToPeerAPI` payload: `<peer>,<api-command>,<raw-bytes>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiRequest<'a> {
    pub peer: &'a str,
    pub command: &'a str,
    pub data: &'a [u8],
}

/// `Subscribe` payload: `<peer>,<stream-name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRef<'a> {
    pub peer: &'a str,
    pub stream: &'a str,
}

/// Build a `SendToPeerAPI` payload.
pub fn encode_api_request(peer: &str, command: &str, data: &[u8]) -> Result<Bytes> {
    check_field("api request", "peer", peer)?;
    check_field("api request", "command", command)?;

    let mut buf = BytesMut::with_capacity(peer.len() + command.len() + data.len() + 2);
    buf.put_slice(peer.as_bytes());
    buf.put_u8(FIELD_SEPARATOR);
    buf.put_slice(command.as_bytes());
    buf.put_u8(FIELD_SEPARATOR);
    buf.put_slice(data);
    Ok(buf.freeze())
}

/// Parse a `SendToPeerAPI` payload.
pub fn parse_api_request(payload: &[u8]) -> Result<ApiRequest<'_>> {
    const KIND: &str = "api request";

    let (peer, rest) = split_field(payload)
        .ok_or_else(|| invalid(KIND, "missing separator after peer address"))?;
    let (command, data) = split_field(rest)
        .ok_or_else(|| invalid(KIND, "missing separator after api command"))?;

    Ok(ApiRequest {
        peer: utf8_field(KIND, "peer", peer)?,
        command: utf8_field(KIND, "command", command)?,
        data,
    })
}

/// Build a `Subscribe` payload.
pub fn encode_subscribe(peer: &str, stream: &str) -> Result<Bytes> {
    check_field("subscribe", "peer", peer)?;
    check_field("subscribe", "stream", stream)?;
    Ok(Bytes::from(format!("{peer},{stream}")))
}

/// Parse a `Subscribe` payload. Anything after a second comma is ignored.
pub fn parse_subscribe(payload: &[u8]) -> Result<StreamRef<'_>> {
    const KIND: &str = "subscribe";

    let (peer, rest) = split_field(payload)
        .ok_or_else(|| invalid(KIND, "missing separator after peer address"))?;
    let stream = match split_field(rest) {
        Some((stream, _)) => stream,
        None => rest,
    };

    Ok(StreamRef {
        peer: utf8_field(KIND, "peer", peer)?,
        stream: utf8_field(KIND, "stream", stream)?,
    })
}

/// Name of the stream a pushed packet belongs to: its data up to the first `/`.
///
/// Returns `None` when that prefix is empty or not UTF-8.
pub fn stream_name_of(data: &[u8]) -> Option<&str> {
    let end = data
        .iter()
        .position(|b| *b == STREAM_PARAMS_SEPARATOR)
        .unwrap_or(data.len());
    std::str::from_utf8(&data[..end])
        .ok()
        .filter(|name| !name.is_empty())
}

fn split_field(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|b| *b == FIELD_SEPARATOR)?;
    Some((&data[..pos], &data[pos + 1..]))
}

fn utf8_field<'a>(kind: &'static str, name: &str, field: &'a [u8]) -> Result<&'a str> {
    let text = std::str::from_utf8(field)
        .map_err(|_| invalid(kind, format!("{name} is not valid UTF-8")))?;
    if text.is_empty() {
        return Err(invalid(kind, format!("{name} is empty")));
    }
    Ok(text)
}

fn check_field(kind: &'static str, name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(invalid(kind, format!("{name} is empty")));
    }
    if value.as_bytes().contains(&FIELD_SEPARATOR) {
        return Err(invalid(kind, format!("{name} must not contain ','")));
    }
    Ok(())
}

fn invalid(kind: &'static str, reason: impl Into<String>) -> FrameError {
    FrameError::InvalidPayload {
        kind,
        reason: reason.into(),
    }
}
