// mockhive-core
//! Domain types for the mockhive instance command dispatcher.
//!
//! Everything in this crate is transient: batches, targets, and results are
//! constructed per dispatch call and discarded once the caller has its
//! per-target answers. Nothing here touches storage or the network.

pub mod error;
pub mod payload;
pub mod types;

pub use error::{AgentPushError, DispatchError};
pub use payload::{
    AgentPush, AgentPushTarget, DeleteApisPayload, StartPayload, StatusPayload, StopPayload,
    SyncApisPayload,
};
pub use types::{
    CommandBatch, CommandTarget, NodeId, Operation, ServiceId, TargetResult, TenantId,
    MSG_AGENT_NOT_RUNNING, MSG_BROADCAST_IGNORED, MSG_CONTROLLER_NOT_FOUND,
    MSG_INSTANCE_NOT_STARTED,
};
