//! Reqwest-backed peer forwarding client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use mockhive_core::TargetResult;
use mockhive_dispatch::{ControllerConfig, PeerClient, PeerError, PeerInstance};

use crate::ApiResponse;

/// HTTP implementation of [`PeerClient`].
///
/// POSTs forwarded batches to `{endpoint_base}{prefix}{path}` on the peer and
/// decodes the standard envelope. The configured forward timeout is the only
/// protection against a hung peer, so it is applied to the whole request.
pub struct HttpPeerClient {
    client: reqwest::Client,
    prefix: String,
}

impl HttpPeerClient {
    pub fn new(config: &ControllerConfig) -> Result<Self, PeerError> {
        let builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.forward_timeout_secs));
        let builder = if cfg!(test) {
            builder.no_proxy()
        } else {
            builder
        };
        let client = builder
            .build()
            .map_err(|e| PeerError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            prefix: config.endpoint_prefix.clone(),
        })
    }

    fn url(&self, peer: &PeerInstance, path: &str) -> String {
        format!(
            "{}{}{}",
            peer.endpoint_base.trim_end_matches('/'),
            self.prefix,
            path
        )
    }

    async fn post(
        &self,
        peer: &PeerInstance,
        path: &str,
        body: &JsonValue,
    ) -> Result<reqwest::Response, PeerError> {
        self.client
            .post(self.url(peer, path))
            .json(body)
            .send()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn forward_batch(
        &self,
        peer: &PeerInstance,
        path: &str,
        body: JsonValue,
    ) -> Result<Vec<TargetResult>, PeerError> {
        let response = self.post(peer, path, &body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PeerError::Status {
                status: status.as_u16(),
            });
        }
        let envelope: ApiResponse<Vec<TargetResult>> = response
            .json()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(PeerError::Remote(
                envelope
                    .error
                    .map(|e| e.error)
                    .unwrap_or_else(|| "unspecified peer error".to_string()),
            ));
        }
        Ok(envelope.data.unwrap_or_default())
    }

    async fn forward_single(
        &self,
        peer: &PeerInstance,
        path: &str,
        body: JsonValue,
    ) -> Result<Option<TargetResult>, PeerError> {
        let response = self.post(peer, path, &body).await?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PeerError::Status {
                status: status.as_u16(),
            });
        }
        let envelope: ApiResponse<TargetResult> = response
            .json()
            .await
            .map_err(|e| PeerError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(PeerError::Remote(
                envelope
                    .error
                    .map(|e| e.error)
                    .unwrap_or_else(|| "unspecified peer error".to_string()),
            ));
        }
        // Absent data on a success envelope means "not handled here".
        Ok(envelope.data)
    }
}
