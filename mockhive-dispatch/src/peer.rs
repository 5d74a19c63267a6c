//! Forwarding transport to peer controllers.
//!
//! The dispatcher serializes the forwarded batch itself; the client only
//! moves JSON and decodes the peer's answer. The HTTP implementation lives
//! in the rest crate; this trait is what the dispatcher (and tests) see.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use mockhive_core::TargetResult;

use crate::directory::PeerInstance;

/// Errors talking to one peer. Always isolated to that peer: the broadcast
/// loop logs and moves on to the next instance.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer transport error: {0}")]
    Transport(String),

    #[error("peer returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to decode peer response: {0}")]
    Decode(String),

    /// The peer answered with its error envelope instead of results.
    #[error("peer reported error: {0}")]
    Remote(String),
}

/// Delivery of forwarded batches to one peer controller.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// POST a forwarded batch to `peer` at the operation's endpoint path and
    /// decode the per-target results it answered with. A peer may answer a
    /// subset of the forwarded targets.
    async fn forward_batch(
        &self,
        peer: &PeerInstance,
        path: &str,
        body: JsonValue,
    ) -> Result<Vec<TargetResult>, PeerError>;

    /// POST a forwarded single-target batch. `Ok(None)` means the peer does
    /// not route that node ("not handled here, try the next one"), not that
    /// the command failed.
    async fn forward_single(
        &self,
        peer: &PeerInstance,
        path: &str,
        body: JsonValue,
    ) -> Result<Option<TargetResult>, PeerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_error_messages() {
        assert!(PeerError::Transport("connection refused".into())
            .to_string()
            .contains("connection refused"));
        assert_eq!(
            PeerError::Status { status: 502 }.to_string(),
            "peer returned HTTP 502"
        );
        assert!(PeerError::Remote("no such tenant".into())
            .to_string()
            .contains("no such tenant"));
    }
}
