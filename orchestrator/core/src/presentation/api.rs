// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /health` | liveness |
//! | `GET /api/nodes`, `POST /api/nodes` | list / create nodes |
//! | `GET /api/nodes/{id}` | node plus its deactivation state |
//! | `POST /api/nodes/{id}/suspend` | operator kill switch, `202 Accepted`, optional `operator_id` |
//! | `GET /api/nodes/{id}/dispatch` | dispatch guard, `403` once suspended |
//! | `GET /api/audit` | audit entries, optional `node_id` and `limit` |
//! | `POST /api/reconcile` | re-drive unaudited suspensions |
//!
//! Suspending only writes the flag. Teardown runs in the background, so the
//! response is `202` whatever the outcome of the deactivation actions.
//! When the caller names an `operator_id`, only that operator's nodes can be
//! suspended; other nodes answer `403` and stay untouched.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use crate::application::kill_switch::{KillSwitchError, KillSwitchOrchestrator};
use crate::application::node_service::NodeService;
use crate::domain::audit::AuditEntry;
use crate::domain::deactivation::DeactivationState;
use crate::domain::node::{Node, NodeId, OperatorId};
use crate::domain::repository::{AuditRepository, RepositoryError};

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<NodeService>,
    pub kill_switch: Arc<KillSwitchOrchestrator>,
    pub audit: Arc<dyn AuditRepository>,
    pub start_time: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/nodes", get(list_nodes_handler).post(create_node_handler))
        .route("/api/nodes/{id}", get(get_node_handler))
        .route("/api/nodes/{id}/suspend", post(suspend_node_handler))
        .route("/api/nodes/{id}/dispatch", get(dispatch_guard_handler))
        .route("/api/audit", get(list_audit_handler))
        .route("/api/reconcile", post(reconcile_handler))
        .with_state(Arc::new(state))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(m) => ApiError::NotFound(m),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<KillSwitchError> for ApiError {
    fn from(err: KillSwitchError) -> Self {
        match err {
            KillSwitchError::NodeStore(e) => e.into(),
            KillSwitchError::NodeNotFound(id) => ApiError::NotFound(format!("Node {} not found", id)),
            e @ KillSwitchError::NoSuspensionTransition(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn parse_node_id(raw: &str) -> Result<NodeId, ApiError> {
    NodeId::from_string(raw).map_err(|_| ApiError::BadRequest(format!("Invalid node ID: {}", raw)))
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub compute_reference: Option<String>,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub state: DeactivationState,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendQuery {
    pub operator_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub node_id: Option<String>,
    pub limit: Option<usize>,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "actions": state.kill_switch.executor().registry().names(),
        "detection_policy": state.kill_switch.detector().policy(),
    }))
}

async fn list_nodes_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<NodeView>>, ApiError> {
    let nodes = state.nodes.list().await?;
    Ok(Json(
        nodes
            .into_iter()
            .map(|node| NodeView { state: state.kill_switch.state_of(&node), node })
            .collect(),
    ))
}

async fn create_node_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNodeRequest>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    if request.owner_id.trim().is_empty() {
        return Err(ApiError::BadRequest("owner_id cannot be empty".to_string()));
    }
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name cannot be empty".to_string()));
    }

    let node = state
        .nodes
        .create_node(
            OperatorId::new(request.owner_id),
            request.name,
            request.compute_reference,
            request.suspended,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_node_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<NodeView>, ApiError> {
    let id = parse_node_id(&id)?;
    let node = state
        .nodes
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Node {} not found", id)))?;
    Ok(Json(NodeView { state: state.kill_switch.state_of(&node), node }))
}

async fn suspend_node_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SuspendQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = parse_node_id(&id)?;
    if let Some(operator) = query.operator_id.as_deref().map(str::trim) {
        let node = state
            .nodes
            .get(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Node {} not found", id)))?;
        if node.owner_id.as_str() != operator {
            return Err(ApiError::Forbidden(format!(
                "Node {} is not owned by operator {}",
                id, operator
            )));
        }
    }
    let change = state.nodes.suspend(id).await?;
    let node = change.after;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "node_id": node.id,
            "suspended": node.suspended,
            "revision": node.revision,
            "transition_revision": node.suspended_at_revision,
            "state": state.kill_switch.state_of(&node),
        })),
    ))
}

async fn dispatch_guard_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_node_id(&id)?;
    let node = state
        .nodes
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Node {} not found", id)))?;

    if node.suspended {
        return Err(ApiError::Forbidden(format!(
            "Node {} is suspended by its operator; dispatch refused",
            node.id
        )));
    }
    Ok(Json(json!({ "node_id": node.id, "dispatch": "allowed" })))
}

async fn list_audit_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT);
    let entries = match query.node_id.as_deref() {
        Some(raw) => {
            let id = parse_node_id(raw)?;
            let mut entries = state.audit.find_by_node(id).await?;
            entries.truncate(limit);
            entries
        }
        None => state.audit.list_recent(limit).await?,
    };
    Ok(Json(entries))
}

async fn reconcile_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let summary = state.kill_switch.reconcile().await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::action_executor::{ActionExecutor, ActionRegistry, ExecutionBudget};
    use crate::domain::transition::{DetectionPolicy, TransitionDetector};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::{InMemoryAuditRepository, InMemoryNodeRepository};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        let node_repo = Arc::new(InMemoryNodeRepository::new());
        let audit_repo = Arc::new(InMemoryAuditRepository::new());
        let kill_switch = KillSwitchOrchestrator::new(
            TransitionDetector::new(DetectionPolicy::Edge),
            ActionExecutor::new(ActionRegistry::new(), ExecutionBudget::default()),
            node_repo.clone(),
            audit_repo.clone(),
            Arc::new(EventBus::with_default_capacity()),
        );
        let nodes = NodeService::new(node_repo).with_listener(kill_switch.clone());
        AppState {
            nodes: Arc::new(nodes),
            kill_switch,
            audit: audit_repo,
            start_time: Instant::now(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_suspend_and_dispatch_guard() {
        let router = app(state());

        let response = router
            .clone()
            .oneshot(post_json("/api/nodes", json!({ "owner_id": "op-1", "name": "primary" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router.clone().oneshot(get(&format!("/api/nodes/{}/dispatch", id))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(post_json(&format!("/api/nodes/{}/suspend", id), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["suspended"], true);
        assert_eq!(body["transition_revision"], 2);

        let response = router.oneshot(get(&format!("/api/nodes/{}/dispatch", id))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_suspend_as_other_operator_is_forbidden() {
        let router = app(state());

        let response = router
            .clone()
            .oneshot(post_json("/api/nodes", json!({ "owner_id": "op-1", "name": "primary" })))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(post_json(&format!("/api/nodes/{}/suspend?operator_id=op-2", id), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router.clone().oneshot(get(&format!("/api/nodes/{}", id))).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["suspended"], false);
        assert_eq!(body["revision"], 1);

        let response = router
            .oneshot(post_json(&format!("/api/nodes/{}/suspend?operator_id=op-1", id), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["suspended"], true);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() {
        let router = app(state());

        let response = router
            .clone()
            .oneshot(post_json(&format!("/api/nodes/{}/suspend", NodeId::new()), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.oneshot(get("/api/nodes/not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_owner() {
        let response = app(state())
            .oneshot(post_json("/api/nodes", json!({ "owner_id": " ", "name": "n" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_audit_and_reconcile_on_empty_store() {
        let router = app(state());

        let response = router.clone().oneshot(get("/api/audit?limit=5")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));

        let response = router.oneshot(post_json("/api/reconcile", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["scanned"], 0);
    }
}
