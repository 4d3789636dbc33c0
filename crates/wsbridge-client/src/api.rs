use bytes::Bytes;
use wsbridge_frame::{encode_api_request, CommandCode};

use crate::client::BridgeClient;
use crate::error::Result;

/// Client-side handle for one peer's API session on the gateway.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: BridgeClient,
    peer: String,
}

impl ApiClient {
    /// Handle for `peer` on `client`. The gateway session must be opened with
    /// `NewAPIClient` (see [`BridgeClient::new_api_client`]).
    pub fn bind(client: BridgeClient, peer: &str) -> Self {
        Self {
            client,
            peer: peer.to_string(),
        }
    }

    /// Address of the remote peer.
    pub fn address(&self) -> &str {
        &self.peer
    }

    /// Send `command` with `data` to the peer and return the request id.
    pub fn send_to(&self, command: &str, data: &[u8]) -> Result<u32> {
        let payload = encode_api_request(&self.peer, command, data)?;
        self.client.issue(CommandCode::SendToPeerApi, payload)
    }

    /// Send `command` with `data` and wait for the peer's answer.
    pub async fn request(&self, command: &str, data: &[u8]) -> Result<Bytes> {
        let payload = encode_api_request(&self.peer, command, data)?;
        self.client.request(CommandCode::SendToPeerApi, payload).await
    }

    /// Wait for the answer to an id returned by [`ApiClient::send_to`].
    pub async fn wait_for(&self, id: u32) -> Result<Bytes> {
        self.client.wait_for(id).await
    }
}
