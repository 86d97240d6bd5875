// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Axum router over [`MissionService`]. Handlers parse and validate the
//! request, call one service operation and map [`MissionError`] to a status
//! code:
//!
//! | Error | Status |
//! |-------|--------|
//! | `Validation` | 400 |
//! | `NotFound`, `NotForkable` | 404 |
//! | `Storage`, `StorageTimeout` | 503 |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::application::errors::MissionError;
use crate::application::mission_service::{EmitEvent, EmitOutcome, MissionService, StartMission};
use crate::application::scripted_driver::ScriptedDriver;
use crate::domain::mission::{MissionId, RunMode};
use crate::domain::step_event::{AgentRole, EventKind, Provenance, UnknownVariant};
use crate::infrastructure::event_bus::{EventBus, EventBusError};

pub struct AppState {
    pub mission_service: Arc<dyn MissionService>,
    pub scripted_driver: Option<Arc<ScriptedDriver>>,
    pub event_bus: EventBus,
    pub started_at: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/missions", get(list_missions_handler).post(start_mission_handler))
        .route("/api/missions/{id}", get(get_mission_handler))
        .route("/api/missions/{id}/events", post(emit_event_handler))
        .route("/api/missions/{id}/tick", post(tick_handler))
        .route("/api/missions/{id}/fork", post(fork_handler))
        .route("/api/missions/{id}/recover", post(recover_handler))
        .route("/api/missions/{id}/stream", get(stream_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub struct ApiError(MissionError);

impl From<MissionError> for ApiError {
    fn from(e: MissionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            MissionError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            MissionError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            MissionError::NotForkable { .. } => (StatusCode::NOT_FOUND, "not_forkable"),
            MissionError::Storage(_) | MissionError::StorageTimeout(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage")
            }
        };

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = json!({
            "error": self.0.to_string(),
            "code": code,
            "retryable": self.0.is_transient(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_mission_id(raw: &str) -> Result<MissionId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(MissionError::Validation(format!("invalid mission id '{}'", raw))))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "scripted_drivers": state.scripted_driver.as_ref().map(|d| d.active_count()).unwrap_or(0),
    }))
}

async fn list_missions_handler(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let missions = state.mission_service.list_missions().await?;
    Ok(Json(missions))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartMissionRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub run_mode: Option<String>,
}

async fn start_mission_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartMissionRequest>,
) -> ApiResult<impl IntoResponse> {
    let run_mode = match request.run_mode.as_deref() {
        None => RunMode::default(),
        Some(raw) => raw.parse::<RunMode>().map_err(MissionError::Validation)?,
    };

    let id = state
        .mission_service
        .start(StartMission {
            title: request.title,
            run_mode,
        })
        .await?;

    if run_mode == RunMode::Scripted {
        if let Some(driver) = &state.scripted_driver {
            driver.launch(id);
        }
    }

    let mission = state.mission_service.get_mission(id).await?;
    Ok((StatusCode::CREATED, Json(mission)))
}

async fn get_mission_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_mission_id(&id)?;
    let view = state.mission_service.get_mission_with_events(id).await?;
    Ok(Json(view))
}

/// Wire form of an emitted event. Enum fields are strings so that unknown
/// values surface as validation errors rather than body rejections.
#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    pub step: i64,
    pub agent: String,
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub provenance: Option<String>,
}

fn invalid_variant(e: UnknownVariant) -> MissionError {
    MissionError::Validation(e.to_string())
}

impl EmitEventRequest {
    fn into_command(self, mission_id: MissionId) -> Result<EmitEvent, MissionError> {
        let step = u32::try_from(self.step)
            .ok()
            .filter(|step| *step >= 1)
            .ok_or_else(|| MissionError::Validation(format!("invalid step {}", self.step)))?;
        let agent: AgentRole = self.agent.parse().map_err(invalid_variant)?;
        let kind: EventKind = self.kind.parse().map_err(invalid_variant)?;
        let provenance = match self.provenance.as_deref() {
            None => Provenance::Scripted,
            Some(raw) => raw.parse().map_err(invalid_variant)?,
        };

        Ok(EmitEvent {
            mission_id,
            step,
            agent,
            kind,
            summary: self.summary,
            payload: self.payload,
            provenance,
        })
    }
}

async fn emit_event_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<EmitEventRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_mission_id(&id)?;
    let command = request.into_command(id)?;
    let outcome = state.mission_service.emit_event(command).await?;

    let status = match outcome {
        EmitOutcome::Accepted { .. } => StatusCode::CREATED,
        EmitOutcome::AlreadyExists { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

async fn tick_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_mission_id(&id)?;
    let outcome = state.mission_service.tick(id).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ForkRequest {
    pub step: i64,
}

#[derive(Debug, Serialize)]
struct ForkResponse {
    mission_id: MissionId,
    parent_mission_id: MissionId,
}

async fn fork_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ForkRequest>,
) -> ApiResult<impl IntoResponse> {
    let parent_id = parse_mission_id(&id)?;
    // Steps past any recorded one clamp in the fork engine.
    let step = u32::try_from(request.step.min(i64::from(u32::MAX)))
        .map_err(|_| MissionError::Validation(format!("invalid fork step {}", request.step)))?;
    let mission_id = state.mission_service.fork(parent_id, step).await?;

    Ok((
        StatusCode::CREATED,
        Json(ForkResponse {
            mission_id,
            parent_mission_id: parent_id,
        }),
    ))
}

async fn recover_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_mission_id(&id)?;
    let mission = state.mission_service.recover(id).await?;
    Ok(Json(mission))
}

/// Server-sent lifecycle notifications for one mission. Hints only: clients
/// refetch the mission for authoritative state.
async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let id = parse_mission_id(&id)?;
    // Fail fast on unknown missions.
    state.mission_service.get_mission(id).await?;

    let receiver = state.event_bus.subscribe_mission(id);
    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize mission event");
                            continue;
                        }
                    };
                    return Some((Ok(Event::default().data(data)), receiver));
                }
                Err(EventBusError::Lagged(n)) => {
                    let hint = Event::default().event("lagged").data(n.to_string());
                    return Some((Ok(hint), receiver));
                }
                Err(_) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
