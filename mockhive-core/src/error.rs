//! Dispatch errors.
//!
//! The split matters: [`AgentPushError`] is a per-target delivery failure and
//! is always flattened into a failing `TargetResult` rather than surfaced to
//! the caller, while [`DispatchError`] is a whole-call failure where no
//! partial answer would be meaningful.

/// Error pushing a command down a live agent channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentPushError {
    /// The channel was live at lookup time but closed before delivery.
    #[error("agent channel closed")]
    ChannelClosed,

    #[error("agent push timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The agent received the command and refused it.
    #[error("agent rejected command: {reason}")]
    Rejected { reason: String },

    #[error("failed to decode agent reply: {reason}")]
    Decode { reason: String },

    #[error("agent transport error: {reason}")]
    Transport { reason: String },
}

impl AgentPushError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Whole-call dispatch failure.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Remote routing was required but the directory lists no
    /// controller-capable hosts. A configuration problem, not a per-target
    /// one: every target would fail identically, so the call fails fast.
    #[error("no controller-capable nodes registered in the service directory")]
    NoControllerNodes,

    /// The peer directory itself could not be resolved.
    #[error("peer directory unavailable: {0}")]
    Directory(String),

    /// The batch shape is wrong for the operation (e.g. a multi-target
    /// SyncApis batch).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("failed to encode command batch: {0}")]
    Encode(#[from] serde_json::Error),
}
