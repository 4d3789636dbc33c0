use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;
use wsbridge_frame::DEFAULT_MAX_PAYLOAD;

use crate::client::BridgeClient;
use crate::error::{ClientError, Result};

/// How long a waiter blocks for its response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// How long [`BridgeClient::connect`] waits for the first connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path the gateway serves WebSocket upgrades on.
pub const GATEWAY_PATH: &str = "/ws";

/// Callback run after every successful reconnect (not the first connect).
pub type ReconnectHandler = Arc<dyn Fn(&BridgeClient) + Send + Sync>;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Gateway endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub url: String,
    pub response_timeout: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Largest inbound payload accepted before decoding.
    pub max_payload_size: usize,
    pub on_reconnected: Option<ReconnectHandler>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            on_reconnected: None,
        }
    }

    /// Run `handler` after each reconnect, typically to replay
    /// `connect_to_peer` / `new_api_client` / `subscribe`.
    pub fn on_reconnected<F>(mut self, handler: F) -> Self
    where
        F: Fn(&BridgeClient) + Send + Sync + 'static,
    {
        self.on_reconnected = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("response_timeout", &self.response_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_payload_size", &self.max_payload_size)
            .field("on_reconnected", &self.on_reconnected.is_some())
            .finish()
    }
}

/// Derive the gateway endpoint from the URL a page was served from.
///
/// `http` maps to `ws` and `https` to `wss`; host and port are kept and the
/// path becomes [`GATEWAY_PATH`].
pub fn ws_url_for(page_url: &str) -> Result<String> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: page_url.to_string(),
        reason,
    };

    let mut url = Url::parse(page_url).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    url.set_path(GATEWAY_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_page_maps_to_ws() {
        assert_eq!(
            ws_url_for("http://localhost:8080/index.html?x=1#top").unwrap(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn https_page_maps_to_wss() {
        assert_eq!(
            ws_url_for("https://example.org/app/").unwrap(),
            "wss://example.org/ws"
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            ws_url_for("ftp://example.org/"),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(ws_url_for("not a url").is_err());
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::new("ws://127.0.0.1:1/ws");
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert!(config.on_reconnected.is_none());
    }
}
