//! Registry of live agent channels.
//!
//! A controller only "owns" the nodes whose agents currently hold a channel
//! to this process. The registry answers the one question the dispatcher
//! asks: "do I have a live local channel to node N for tenant T?" and, if
//! so, hands back a handle that can push a command and await the reply.
//!
//! The registry is an injected capability, not a process-global: the
//! dispatcher takes it as `Arc<dyn AgentRegistry>` so tests can supply a
//! fake with deterministic present/absent routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use mockhive_core::{AgentPushError, NodeId, Operation, TenantId};

/// A live, in-process-reachable channel to one node's agent.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Deliver a command payload to the agent and await its reply.
    ///
    /// `body` is the JSON-serialized [`mockhive_core::AgentPush`] for the
    /// node group; the reply is decoded by the dispatcher, not here.
    async fn push(&self, operation: Operation, body: JsonValue)
        -> Result<JsonValue, AgentPushError>;
}

/// Read-only lookup of local agent channels.
pub trait AgentRegistry: Send + Sync {
    fn lookup(&self, node_id: &NodeId, tenant_id: TenantId) -> Option<Arc<dyn AgentHandle>>;
}

type ChannelKey = (NodeId, TenantId);

/// Production [`AgentRegistry`]: live channels keyed by `(node, tenant)`.
///
/// Agents register their channel when they connect to this controller and
/// unregister on disconnect. A single lock guards the map; entries are
/// cheap `Arc` clones, so read contention is negligible.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelKey, Arc<dyn AgentHandle>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a channel for `(node, tenant)`, replacing any existing one.
    ///
    /// Replacement matters on agent reconnect: the stale channel of the dead
    /// connection must not shadow the live one.
    pub fn register(&self, node_id: NodeId, tenant_id: TenantId, handle: Arc<dyn AgentHandle>) {
        self.channels.write().insert((node_id, tenant_id), handle);
    }

    /// Remove a channel. Returns true if one was present.
    pub fn unregister(&self, node_id: &NodeId, tenant_id: TenantId) -> bool {
        self.channels
            .write()
            .remove(&(node_id.clone(), tenant_id))
            .is_some()
    }

    pub fn contains(&self, node_id: &NodeId, tenant_id: TenantId) -> bool {
        self.channels
            .read()
            .contains_key(&(node_id.clone(), tenant_id))
    }

    /// Node ids this controller can locally route for a tenant.
    pub fn node_ids(&self, tenant_id: TenantId) -> Vec<NodeId> {
        self.channels
            .read()
            .keys()
            .filter(|(_, t)| *t == tenant_id)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Drop all channels (primarily for tests).
    pub fn clear(&self) {
        self.channels.write().clear();
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry for ChannelRegistry {
    fn lookup(&self, node_id: &NodeId, tenant_id: TenantId) -> Option<Arc<dyn AgentHandle>> {
        self.channels
            .read()
            .get(&(node_id.clone(), tenant_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticHandle {
        reply: JsonValue,
    }

    #[async_trait]
    impl AgentHandle for StaticHandle {
        async fn push(
            &self,
            _operation: Operation,
            _body: JsonValue,
        ) -> Result<JsonValue, AgentPushError> {
            Ok(self.reply.clone())
        }
    }

    fn handle(reply: JsonValue) -> Arc<dyn AgentHandle> {
        Arc::new(StaticHandle { reply })
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ChannelRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ChannelRegistry::new();
        let node = NodeId::new("10.0.0.1");
        registry.register(node.clone(), TenantId(1), handle(json!([])));

        assert!(registry.contains(&node, TenantId(1)));
        assert!(registry.lookup(&node, TenantId(1)).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_is_tenant_scoped() {
        let registry = ChannelRegistry::new();
        let node = NodeId::new("10.0.0.1");
        registry.register(node.clone(), TenantId(1), handle(json!([])));

        assert!(registry.lookup(&node, TenantId(2)).is_none());
        assert!(!registry.contains(&node, TenantId(2)));
    }

    #[test]
    fn test_unregister() {
        let registry = ChannelRegistry::new();
        let node = NodeId::new("10.0.0.1");
        registry.register(node.clone(), TenantId(1), handle(json!([])));

        assert!(registry.unregister(&node, TenantId(1)));
        assert!(registry.lookup(&node, TenantId(1)).is_none());
        assert!(registry.is_empty());

        // Second unregister is a safe no-op
        assert!(!registry.unregister(&node, TenantId(1)));
    }

    #[tokio::test]
    async fn test_register_replaces_existing_channel() {
        let registry = ChannelRegistry::new();
        let node = NodeId::new("10.0.0.1");
        registry.register(node.clone(), TenantId(1), handle(json!("old")));
        registry.register(node.clone(), TenantId(1), handle(json!("new")));

        assert_eq!(registry.len(), 1);
        let found = registry.lookup(&node, TenantId(1)).unwrap();
        let reply = found.push(Operation::Status, json!({})).await.unwrap();
        assert_eq!(reply, json!("new"));
    }

    #[test]
    fn test_node_ids_filters_by_tenant() {
        let registry = ChannelRegistry::new();
        registry.register(NodeId::new("10.0.0.1"), TenantId(1), handle(json!([])));
        registry.register(NodeId::new("10.0.0.2"), TenantId(1), handle(json!([])));
        registry.register(NodeId::new("10.0.0.3"), TenantId(2), handle(json!([])));

        let mut nodes = registry.node_ids(TenantId(1));
        nodes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(nodes, vec![NodeId::new("10.0.0.1"), NodeId::new("10.0.0.2")]);
    }

    #[test]
    fn test_clear() {
        let registry = ChannelRegistry::new();
        registry.register(NodeId::new("10.0.0.1"), TenantId(1), handle(json!([])));
        registry.register(NodeId::new("10.0.0.2"), TenantId(2), handle(json!([])));

        registry.clear();
        assert!(registry.is_empty());
    }
}
