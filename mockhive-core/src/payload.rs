//! Per-operation payload types and the agent wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{Operation, ServiceId};

/// Payload for Start: runtime parameters of the instance being launched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    /// Listen port to bind the mock service on. `None` lets the agent pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Opaque environment/config block handed straight to the agent.
    #[serde(default)]
    pub env: JsonValue,
}

/// Payload for Stop. Carries nothing; the target identity says it all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopPayload {}

/// Payload for Status. Carries nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {}

/// Payload for SyncApis: the API definitions to push to a running instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncApisPayload {
    pub apis: Vec<JsonValue>,
}

/// Payload for DeleteApis: ids of the API definitions to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteApisPayload {
    pub api_ids: Vec<i64>,
}

/// What actually goes down an agent channel: the operation plus the payloads
/// for every target in one node group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPush<P> {
    pub operation: Operation,
    pub targets: Vec<AgentPushTarget<P>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPushTarget<P> {
    pub service_id: ServiceId,
    pub payload: P,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_payload_defaults() {
        let payload: StartPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.port.is_none());
        assert_eq!(payload.env, JsonValue::Null);
    }

    #[test]
    fn test_agent_push_round_trip() {
        let push = AgentPush {
            operation: Operation::SyncApis,
            targets: vec![AgentPushTarget {
                service_id: ServiceId(42),
                payload: SyncApisPayload {
                    apis: vec![json!({"path": "/ping", "method": "GET"})],
                },
            }],
        };
        let encoded = serde_json::to_value(&push).unwrap();
        assert_eq!(encoded["operation"], "sync_apis");
        let decoded: AgentPush<SyncApisPayload> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, push);
    }

    #[test]
    fn test_delete_apis_payload_serde() {
        let payload = DeleteApisPayload {
            api_ids: vec![10, 11],
        };
        let encoded = serde_json::to_value(&payload).unwrap();
        assert_eq!(encoded, json!({"api_ids": [10, 11]}));
    }
}
