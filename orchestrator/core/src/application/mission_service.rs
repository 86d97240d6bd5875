// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mission Service
//!
//! The operations exposed to callers (HTTP API, CLI daemon, scripted
//! driver). Each operation is a thin sequence over the ledger and the
//! engines; no operation takes a lock.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::MissionError;
use crate::application::fork_engine::ForkEngine;
use crate::application::ledger::MissionLedger;
use crate::application::tick_engine::{TickEngine, TickOutcome};
use crate::domain::content::{DefaultContent, DefaultContentProvider};
use crate::domain::events::MissionLifecycleEvent;
use crate::domain::mission::{Mission, MissionId, MissionStatus, RunMode};
use crate::domain::projection::MissionProjection;
use crate::domain::repository::{EventQuery, MAX_RECENT_MISSIONS};
use crate::domain::step_event::{
    AgentRole, AppendOutcome, EventKind, NewStepEvent, Provenance, StepEvent,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartMission {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub run_mode: RunMode,
}

/// An externally authored event, e.g. from the scripted driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEvent {
    pub mission_id: MissionId,
    pub step: u32,
    pub agent: AgentRole,
    pub kind: EventKind,
    pub summary: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmitOutcome {
    Accepted { event: StepEvent },
    /// The step was already recorded; carries the stored event, not the
    /// submitted one.
    AlreadyExists { event: StepEvent },
}

impl EmitOutcome {
    pub fn event(&self) -> &StepEvent {
        match self {
            EmitOutcome::Accepted { event } | EmitOutcome::AlreadyExists { event } => event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionWithEvents {
    pub mission: Mission,
    /// First page of the log, ascending by step.
    pub events: Vec<StepEvent>,
}

#[async_trait]
pub trait MissionService: Send + Sync {
    /// Create a running mission with its step-1 event already recorded.
    async fn start(&self, request: StartMission) -> Result<MissionId, MissionError>;

    async fn get_mission(&self, id: MissionId) -> Result<Mission, MissionError>;

    async fn get_mission_with_events(&self, id: MissionId) -> Result<MissionWithEvents, MissionError>;

    async fn emit_event(&self, request: EmitEvent) -> Result<EmitOutcome, MissionError>;

    async fn tick(&self, id: MissionId) -> Result<TickOutcome, MissionError>;

    async fn fork(&self, parent_id: MissionId, fork_step: u32) -> Result<MissionId, MissionError>;

    /// Most recently created missions, newest first.
    async fn list_missions(&self) -> Result<Vec<Mission>, MissionError>;

    /// Recompute the aggregate from the full log and persist it.
    async fn recover(&self, id: MissionId) -> Result<Mission, MissionError>;
}

pub struct StandardMissionService {
    ledger: Arc<MissionLedger>,
    tick_engine: Arc<TickEngine>,
    fork_engine: ForkEngine,
    defaults: Arc<dyn DefaultContentProvider>,
}

impl StandardMissionService {
    pub fn new(
        ledger: Arc<MissionLedger>,
        tick_engine: Arc<TickEngine>,
        defaults: Arc<dyn DefaultContentProvider>,
    ) -> Self {
        Self {
            fork_engine: ForkEngine::new(ledger.clone()),
            ledger,
            tick_engine,
            defaults,
        }
    }
}

#[async_trait]
impl MissionService for StandardMissionService {
    async fn start(&self, request: StartMission) -> Result<MissionId, MissionError> {
        let schedule = self.ledger.schedule();
        let slot = schedule
            .slot(1)
            .ok_or_else(|| MissionError::Validation("schedule has no first step".to_string()))?;

        let mut mission = Mission::new(request.title, request.run_mode);
        let content = self
            .defaults
            .content_for(1)
            .unwrap_or_else(|| DefaultContent::generic(1, slot));
        let seed = NewStepEvent::new(
            mission.id,
            1,
            slot.agent,
            slot.kind,
            content.summary,
            content.payload,
            Provenance::Scripted,
        );
        mission.apply(&StepEvent::from_new(seed.clone()), schedule);

        self.ledger.create(&mission, &[seed]).await?;

        info!(
            mission_id = %mission.id,
            run_mode = %mission.run_mode,
            title = %mission.title,
            "Mission started"
        );
        self.ledger.event_bus().publish(MissionLifecycleEvent::MissionStarted {
            mission_id: mission.id,
            title: mission.title.clone(),
            run_mode: mission.run_mode,
            started_at: mission.created_at,
        });

        Ok(mission.id)
    }

    async fn get_mission(&self, id: MissionId) -> Result<Mission, MissionError> {
        self.ledger.load(id).await
    }

    async fn get_mission_with_events(&self, id: MissionId) -> Result<MissionWithEvents, MissionError> {
        let mission = self.ledger.load(id).await?;
        let events = self.ledger.page(id, EventQuery::first_page()).await?;
        Ok(MissionWithEvents { mission, events })
    }

    async fn emit_event(&self, request: EmitEvent) -> Result<EmitOutcome, MissionError> {
        let event = NewStepEvent::new(
            request.mission_id,
            request.step,
            request.agent,
            request.kind,
            request.summary,
            request.payload,
            request.provenance,
        )
        .validate()
        .map_err(MissionError::Validation)?;

        let mut mission = self.ledger.load(request.mission_id).await?;

        match self.ledger.append(event).await? {
            AppendOutcome::Inserted(stored) => {
                self.ledger.project(&mut mission, &stored).await?;
                Ok(EmitOutcome::Accepted { event: stored })
            }
            AppendOutcome::AlreadyExists(existing) => {
                debug!(mission_id = %mission.id, step = existing.step, "Emit hit an existing step");
                self.ledger.project(&mut mission, &existing).await?;
                Ok(EmitOutcome::AlreadyExists { event: existing })
            }
        }
    }

    async fn tick(&self, id: MissionId) -> Result<TickOutcome, MissionError> {
        self.tick_engine.tick(id).await
    }

    async fn fork(&self, parent_id: MissionId, fork_step: u32) -> Result<MissionId, MissionError> {
        let fork = self.fork_engine.fork(parent_id, fork_step).await?;
        Ok(fork.id)
    }

    async fn list_missions(&self) -> Result<Vec<Mission>, MissionError> {
        self.ledger.recent(MAX_RECENT_MISSIONS).await
    }

    async fn recover(&self, id: MissionId) -> Result<Mission, MissionError> {
        let mut mission = self.ledger.load(id).await?;
        let events = self.ledger.collect_events(id, None).await?;
        let schedule = self.ledger.schedule();

        let mut projection = MissionProjection::fold(&events, schedule);

        // A fork starts running whatever its copied prefix folds to; only
        // events recorded after the branch point can complete it.
        projection.status = match &mission.lineage {
            Some(lineage) => {
                let completed = events
                    .iter()
                    .filter(|e| e.step > lineage.branch_from_step)
                    .any(|e| schedule.completes(e));
                if completed {
                    MissionStatus::Done
                } else {
                    mission.status
                }
            }
            None if projection.status == MissionStatus::Done => MissionStatus::Done,
            None => mission.status,
        };

        let before = mission.projection();
        if before == projection {
            debug!(mission_id = %id, "Aggregate already matches the log");
            return Ok(mission);
        }

        if projection.current_step < before.current_step {
            warn!(
                mission_id = %id,
                cached_step = before.current_step,
                log_step = projection.current_step,
                "Cached aggregate is ahead of the log"
            );
        }

        mission.set_projection(projection);
        mission.updated_at = Utc::now();
        self.ledger.save_projection(&mut mission).await?;

        info!(
            mission_id = %id,
            from_step = before.current_step,
            to_step = mission.current_step,
            status = %mission.status,
            "Recovered mission aggregate"
        );
        Ok(mission)
    }
}
