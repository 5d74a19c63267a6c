//! Core command and result types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Fixed message for remote-bucket targets when broadcast is disabled.
///
/// Callers branch on this string to distinguish "forwarding was refused by
/// policy" from "forwarding was attempted and failed", so it must stay stable.
pub const MSG_BROADCAST_IGNORED: &str = "broadcast ignored, remote routing disabled";

/// Fixed message for targets no reachable peer answered.
pub const MSG_AGENT_NOT_RUNNING: &str = "agent not running";

/// Fixed message when no peer in the directory was reachable at all.
pub const MSG_INSTANCE_NOT_STARTED: &str = "instance or agent not started";

/// Fixed message when no peer produced a result for a single-target command.
pub const MSG_CONTROLLER_NOT_FOUND: &str = "controller instance not found";

/// Identity of a node hosting mock-service instances.
///
/// Equals the node's registered IP in the peer directory, which is what
/// controller-capability checks compare against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a mock-service instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServiceId(pub i64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tenant (project) scope for agent-channel lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The logical operation a batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Start,
    Stop,
    Status,
    SyncApis,
    DeleteApis,
}

impl Operation {
    /// Path of the controller-to-controller forwarding endpoint, relative to
    /// the configured URL prefix.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Operation::Start => "/instances/start",
            Operation::Stop => "/instances/stop",
            Operation::Status => "/instances/status",
            Operation::SyncApis => "/instances/apis/sync",
            Operation::DeleteApis => "/instances/apis/delete",
        }
    }

    /// Whether the operation takes a multi-target batch.
    ///
    /// SyncApis and DeleteApis are always single-target; their dispatch path
    /// is first-success-wins across peers rather than per-target merging.
    pub fn is_batch(&self) -> bool {
        matches!(self, Operation::Start | Operation::Stop | Operation::Status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Status => "status",
            Operation::SyncApis => "sync_apis",
            Operation::DeleteApis => "delete_apis",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance a command applies to.
///
/// Identity within a batch is `(node_id, service_id)`; uniqueness of
/// `service_id` across a batch is assumed, not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTarget<P> {
    pub node_id: NodeId,
    pub service_id: ServiceId,
    pub payload: P,
}

impl<P> CommandTarget<P> {
    pub fn new(node_id: NodeId, service_id: ServiceId, payload: P) -> Self {
        Self {
            node_id,
            service_id,
            payload,
        }
    }
}

/// A batch of targets for one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch<P> {
    pub operation: Operation,
    pub tenant_id: TenantId,
    pub targets: Vec<CommandTarget<P>>,
    /// "If local delivery is impossible, try peers." One-shot, not a TTL:
    /// forwarded copies always carry `false`, which is what prevents
    /// controller-to-controller relay loops.
    #[serde(default)]
    pub broadcast: bool,
}

impl<P> CommandBatch<P> {
    pub fn new(
        operation: Operation,
        tenant_id: TenantId,
        targets: Vec<CommandTarget<P>>,
        broadcast: bool,
    ) -> Self {
        Self {
            operation,
            tenant_id,
            targets,
            broadcast,
        }
    }

    /// Build a single-target batch for SyncApis/DeleteApis-style operations.
    pub fn single(
        operation: Operation,
        tenant_id: TenantId,
        target: CommandTarget<P>,
        broadcast: bool,
    ) -> Self {
        Self::new(operation, tenant_id, vec![target], broadcast)
    }

    /// Build the copy of this batch that gets POSTed to a peer: the given
    /// subset of targets, with broadcast forced off.
    pub fn forwarded(&self, targets: Vec<CommandTarget<P>>) -> Self {
        Self {
            operation: self.operation,
            tenant_id: self.tenant_id,
            targets,
            broadcast: false,
        }
    }

    /// Service ids in input order.
    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.targets.iter().map(|t| t.service_id).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Per-target outcome of a dispatch.
///
/// The reconciler guarantees exactly one of these per requested target in
/// every batch answer, whatever combination of nodes and peers failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub service_id: ServiceId,
    pub success: bool,
    pub message: String,
    /// Operation-specific extras, e.g. process exit code for Stop or runtime
    /// state for Status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl TargetResult {
    pub fn ok(service_id: ServiceId, message: impl Into<String>) -> Self {
        Self {
            service_id,
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failed(service_id: ServiceId, message: impl Into<String>) -> Self {
        Self {
            service_id,
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}
