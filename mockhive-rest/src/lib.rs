//! mockhive-rest - HTTP surface for a mockhive controller.
//!
//! Exposes the per-operation forwarding endpoints peer controllers POST to:
//! - POST {prefix}/instances/start
//! - POST {prefix}/instances/stop
//! - POST {prefix}/instances/status
//! - POST {prefix}/instances/apis/sync
//! - POST {prefix}/instances/apis/delete
//! - GET /health - liveness probe
//!
//! Each accepts a serialized `CommandBatch` and answers the result list (or
//! single result) wrapped in the standard success/error envelope. The
//! `broadcast` flag picks the handling mode: `true` runs the full
//! local-then-broadcast dispatch, `false` - which is what every forwarded
//! batch carries - runs local-only handling, answering just the targets this
//! controller can route so the origin backfills the rest.

pub mod peer_client;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use mockhive_core::{
    CommandBatch, DispatchError, StartPayload, StatusPayload, StopPayload, SyncApisPayload,
    TargetResult,
};
use mockhive_dispatch::Dispatcher;

pub use peer_client::HttpPeerClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Standard response envelope for all endpoints.
///
/// `success=true` with absent `data` on a single-target endpoint means "not
/// handled by this controller" - the probing origin tries the next peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn not_handled() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                error: error.into(),
                code: code.into(),
            }),
        }
    }
}

/// Build the controller's HTTP router, mounting the forwarding endpoints
/// under the configured prefix.
pub fn router(state: AppState) -> Router {
    let prefix = state.dispatcher.config().endpoint_prefix.clone();
    let api = Router::new()
        .route("/instances/start", post(start_instances))
        .route("/instances/stop", post(stop_instances))
        .route("/instances/status", post(status_instances))
        .route("/instances/apis/sync", post(sync_apis))
        .route("/instances/apis/delete", post(delete_apis))
        .with_state(state);
    Router::new()
        .route("/health", get(health_check))
        .nest(&prefix, api)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn start_instances(
    State(state): State<AppState>,
    Json(batch): Json<CommandBatch<StartPayload>>,
) -> Result<Json<ApiResponse<Vec<TargetResult>>>, ApiError> {
    let results = if batch.broadcast {
        state.dispatcher.dispatch_batch(&batch).await?
    } else {
        state.dispatcher.dispatch_local(&batch).await
    };
    Ok(Json(ApiResponse::ok(results)))
}

/// Stop purges runtime metrics before dispatching. Only the originating hop
/// purges: a forwarded batch (`broadcast=false`) arrives after the origin
/// already purged every service id in it.
async fn stop_instances(
    State(state): State<AppState>,
    Json(batch): Json<CommandBatch<StopPayload>>,
) -> Result<Json<ApiResponse<Vec<TargetResult>>>, ApiError> {
    let results = if batch.broadcast {
        state.dispatcher.dispatch_stop(&batch).await?
    } else {
        state.dispatcher.dispatch_local(&batch).await
    };
    Ok(Json(ApiResponse::ok(results)))
}

async fn status_instances(
    State(state): State<AppState>,
    Json(batch): Json<CommandBatch<StatusPayload>>,
) -> Result<Json<ApiResponse<Vec<TargetResult>>>, ApiError> {
    let results = if batch.broadcast {
        state.dispatcher.dispatch_batch(&batch).await?
    } else {
        state.dispatcher.dispatch_local(&batch).await
    };
    Ok(Json(ApiResponse::ok(results)))
}

async fn sync_apis(
    State(state): State<AppState>,
    Json(batch): Json<CommandBatch<SyncApisPayload>>,
) -> Result<Json<ApiResponse<TargetResult>>, ApiError> {
    single_op(&state, batch).await
}

async fn delete_apis(
    State(state): State<AppState>,
    Json(batch): Json<CommandBatch<mockhive_core::DeleteApisPayload>>,
) -> Result<Json<ApiResponse<TargetResult>>, ApiError> {
    single_op(&state, batch).await
}

async fn single_op<P>(
    state: &AppState,
    batch: CommandBatch<P>,
) -> Result<Json<ApiResponse<TargetResult>>, ApiError>
where
    P: Serialize + Clone + Send + Sync,
{
    if batch.broadcast {
        let result = state.dispatcher.dispatch_single(&batch).await?;
        Ok(Json(ApiResponse::ok(result)))
    } else {
        match state.dispatcher.dispatch_single_local(&batch).await? {
            Some(result) => Ok(Json(ApiResponse::ok(result))),
            None => Ok(Json(ApiResponse::not_handled())),
        }
    }
}

/// API error: the whole-call dispatch failures, mapped onto the envelope.
#[derive(Debug)]
pub struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            DispatchError::NoControllerNodes => {
                (StatusCode::INTERNAL_SERVER_ERROR, "NO_CONTROLLER_NODES")
            }
            DispatchError::Directory(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DIRECTORY_ERROR"),
            DispatchError::InvalidBatch(_) => (StatusCode::BAD_REQUEST, "INVALID_BATCH"),
            DispatchError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
        };
        let body = Json(ApiResponse::<()>::failed(self.0.to_string(), code));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use mockhive_core::{CommandTarget, NodeId, Operation, ServiceId, TenantId};
    use mockhive_dispatch::{
        ChannelRegistry, ControllerConfig, NoopMetricsStore, StaticDirectory,
    };
    use serde_json::{json, Value as JsonValue};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = ControllerConfig::with_self_host("10.0.0.1");
        let peers = Arc::new(HttpPeerClient::new(&config).unwrap());
        AppState {
            dispatcher: Arc::new(Dispatcher::new(
                Arc::new(ChannelRegistry::new()),
                Arc::new(StaticDirectory::default()),
                peers,
                Arc::new(NoopMetricsStore),
                config,
            )),
        }
    }

    async fn body_json(response: Response) -> JsonValue {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &JsonValue) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_status_answers_local_subset() {
        let app = router(test_state());
        let batch = json!({
            "operation": "status",
            "tenant_id": 1,
            "targets": [
                {"node_id": "n1", "service_id": 1, "payload": {}},
            ],
            "broadcast": false,
        });
        let response = app
            .oneshot(post_json("/api/mock/instances/status", &batch))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // No local channel: empty subset, origin backfills.
        assert_eq!(body, json!({"success": true, "data": []}));
    }

    #[tokio::test]
    async fn test_empty_directory_maps_to_error_envelope() {
        let app = router(test_state());
        let batch = json!({
            "operation": "status",
            "tenant_id": 1,
            "targets": [
                {"node_id": "n1", "service_id": 1, "payload": {}},
            ],
            "broadcast": true,
        });
        let response = app
            .oneshot(post_json("/api/mock/instances/status", &batch))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("NO_CONTROLLER_NODES"));
    }

    #[tokio::test]
    async fn test_forwarded_sync_not_handled_has_no_data() {
        let app = router(test_state());
        let batch = json!({
            "operation": "sync_apis",
            "tenant_id": 1,
            "targets": [
                {"node_id": "n1", "service_id": 4, "payload": {"apis": []}},
            ],
            "broadcast": false,
        });
        let response = app
            .oneshot(post_json("/api/mock/instances/apis/sync", &batch))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_multi_target_sync_is_rejected() {
        let app = router(test_state());
        let batch = json!({
            "operation": "sync_apis",
            "tenant_id": 1,
            "targets": [
                {"node_id": "n1", "service_id": 1, "payload": {"apis": []}},
                {"node_id": "n2", "service_id": 2, "payload": {"apis": []}},
            ],
            "broadcast": true,
        });
        let response = app
            .oneshot(post_json("/api/mock/instances/apis/sync", &batch))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("INVALID_BATCH"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mock/instances/start")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[test]
    fn test_envelope_serialization() {
        let ok = ApiResponse::ok(vec![TargetResult::ok(ServiceId(1), "started")]);
        let encoded = serde_json::to_value(&ok).unwrap();
        assert_eq!(encoded["success"], json!(true));
        assert!(encoded.get("error").is_none());

        let failed = ApiResponse::<()>::failed("boom", "INTERNAL");
        let encoded = serde_json::to_value(&failed).unwrap();
        assert_eq!(encoded["success"], json!(false));
        assert_eq!(encoded["error"]["code"], json!("INTERNAL"));
        assert!(encoded.get("data").is_none());
    }

    #[test]
    fn test_batch_deserializes_from_wire_shape() {
        let raw = json!({
            "operation": "start",
            "tenant_id": 3,
            "targets": [
                {"node_id": "10.0.1.5", "service_id": 12, "payload": {"port": 8026, "env": {}}},
            ],
            "broadcast": true,
        });
        let batch: CommandBatch<StartPayload> = serde_json::from_value(raw).unwrap();
        assert_eq!(batch.operation, Operation::Start);
        assert_eq!(batch.tenant_id, TenantId(3));
        assert_eq!(
            batch.targets[0],
            CommandTarget::new(
                NodeId::new("10.0.1.5"),
                ServiceId(12),
                StartPayload {
                    port: Some(8026),
                    env: json!({}),
                }
            )
        );
    }
}
