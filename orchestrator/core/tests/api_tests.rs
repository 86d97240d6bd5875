// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

use missionlog_core::application::repository_factory::build_runtime_with_store;
use missionlog_core::domain::config::MissionlogConfig;
use missionlog_core::domain::mission::{Mission, MissionId};
use missionlog_core::domain::repository::{
    EventQuery, EventRepository, MissionRepository, MissionStore, RepositoryError,
};
use missionlog_core::domain::step_event::{AppendOutcome, NewStepEvent, StepEvent};
use missionlog_core::infrastructure::repositories::InMemoryMissionStore;
use missionlog_core::presentation::api::{app, AppState};

fn router_with_store(store: Arc<dyn MissionStore>) -> Router {
    let runtime = build_runtime_with_store(&MissionlogConfig::default(), store, None).unwrap();
    app(AppState {
        mission_service: runtime.mission_service.clone(),
        scripted_driver: None,
        event_bus: runtime.event_bus.clone(),
        started_at: Instant::now(),
    })
}

fn router() -> Router {
    router_with_store(Arc::new(InMemoryMissionStore::new()))
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start_generated(router: &Router) -> String {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/missions",
        Some(json!({"title": "API mission", "run_mode": "generated"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&router(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_start_and_get_mission() {
    let router = router();
    let id = start_generated(&router).await;

    let (status, body) = send(&router, Method::GET, &format!("/api/missions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mission"]["current_step"], 1);
    assert_eq!(body["mission"]["status"], "running");
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
    assert_eq!(body["events"][0]["kind"], "plan");

    let (status, body) = send(&router, Method::GET, "/api/missions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_status_codes() {
    let router = router();

    let (status, body) = send(&router, Method::GET, "/api/missions/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let unknown = MissionId::new();
    let (status, _) = send(&router, Method::GET, &format!("/api/missions/{}", unknown), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/missions",
        Some(json!({"run_mode": "interactive"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_emit_event_duplicate_and_validation() {
    let router = router();
    let id = start_generated(&router).await;
    let uri = format!("/api/missions/{}/events", id);

    let event = |summary: &str| {
        json!({
            "step": 2,
            "agent": "planner",
            "kind": "assign",
            "summary": summary,
            "payload": {"assignee": "researcher"}
        })
    };

    let (status, body) = send(&router, Method::POST, &uri, Some(event("summary A"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["outcome"], "accepted");

    let (status, body) = send(&router, Method::POST, &uri, Some(event("summary B"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_exists");
    assert_eq!(body["event"]["summary"], "summary A");

    let (status, _) = send(
        &router,
        Method::POST,
        &uri,
        Some(json!({"step": 3, "agent": "manager", "kind": "note", "summary": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Method::POST,
        &uri,
        Some(json!({"step": -1, "agent": "planner", "kind": "note", "summary": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tick_fork_and_recover() {
    let router = router();
    let id = start_generated(&router).await;

    let (status, body) = send(&router, Method::POST, &format!("/api/missions/{}/tick", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "advanced");
    assert_eq!(body["event"]["step"], 2);
    assert_eq!(body["event"]["provenance"], "fallback");

    let (status, body) = send(
        &router,
        Method::POST,
        &format!("/api/missions/{}/fork", id),
        Some(json!({"step": 99})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let fork_id = body["mission_id"].as_str().unwrap().to_string();

    let (status, body) = send(&router, Method::POST, &format!("/api/missions/{}/recover", fork_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_step"], 2);
    assert_eq!(body["lineage"]["branch_from_step"], 2);
}

#[tokio::test]
async fn test_steps_beyond_the_log_range() {
    let router = router();
    let id = start_generated(&router).await;

    let (status, body) = send(
        &router,
        Method::POST,
        &format!("/api/missions/{}/events", id),
        Some(json!({"step": 3_000_000_000u64, "agent": "planner", "kind": "note", "summary": "far"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = send(
        &router,
        Method::POST,
        &format!("/api/missions/{}/fork", id),
        Some(json!({"step": 10_000_000_000u64})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let fork_id = body["mission_id"].as_str().unwrap().to_string();

    let (status, body) = send(&router, Method::GET, &format!("/api/missions/{}", fork_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mission"]["current_step"], 1);
}

#[tokio::test]
async fn test_tick_scripted_mission_is_rejected() {
    let router = router();
    let (_, body) = send(&router, Method::POST, "/api/missions", Some(json!({}))).await;
    let id = body["id"].as_str().unwrap();

    let (status, _) = send(&router, Method::POST, &format!("/api/missions/{}/tick", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Store that is reachable for writes but fails every read.
struct UnreachableStore {
    inner: InMemoryMissionStore,
}

#[async_trait]
impl MissionRepository for UnreachableStore {
    async fn create(&self, mission: &Mission, seed_events: &[NewStepEvent]) -> Result<(), RepositoryError> {
        self.inner.create(mission, seed_events).await
    }

    async fn find_by_id(&self, _id: MissionId) -> Result<Option<Mission>, RepositoryError> {
        Err(RepositoryError::Database("connection reset".to_string()))
    }

    async fn save_projection(&self, mission: &Mission) -> Result<Mission, RepositoryError> {
        self.inner.save_projection(mission).await
    }

    async fn find_recent(&self, _limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        Err(RepositoryError::Database("connection reset".to_string()))
    }
}

#[async_trait]
impl EventRepository for UnreachableStore {
    async fn append(&self, event: NewStepEvent) -> Result<AppendOutcome, RepositoryError> {
        self.inner.append(event).await
    }

    async fn list(&self, mission_id: MissionId, query: EventQuery) -> Result<Vec<StepEvent>, RepositoryError> {
        self.inner.list(mission_id, query).await
    }

    async fn find(&self, mission_id: MissionId, step: u32) -> Result<Option<StepEvent>, RepositoryError> {
        self.inner.find(mission_id, step).await
    }
}

#[tokio::test]
async fn test_storage_failure_is_service_unavailable() {
    let router = router_with_store(Arc::new(UnreachableStore {
        inner: InMemoryMissionStore::new(),
    }));

    let (status, body) = send(&router, Method::GET, "/api/missions", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    let (status, _) = send(
        &router,
        Method::GET,
        &format!("/api/missions/{}", MissionId::new()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
