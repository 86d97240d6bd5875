// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fork Engine
//!
//! Branches a new, independent mission from a prefix of an existing log.
//!
//! The requested fork step is clamped silently to the highest step actually
//! recorded at or before it. Copied events keep their step, agent, kind,
//! summary, payload, timestamp and provenance; only their identity and owning
//! mission change. The fork and its copies are written in a single
//! `create` call, so a crash never leaves a half-copied lineage behind.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::application::errors::MissionError;
use crate::application::ledger::MissionLedger;
use crate::domain::events::MissionLifecycleEvent;
use crate::domain::mission::{Mission, MissionId};
use crate::domain::projection::MissionProjection;
use crate::domain::step_event::NewStepEvent;

pub struct ForkEngine {
    ledger: Arc<MissionLedger>,
}

impl ForkEngine {
    pub fn new(ledger: Arc<MissionLedger>) -> Self {
        Self { ledger }
    }

    pub async fn fork(&self, parent_id: MissionId, fork_step: u32) -> Result<Mission, MissionError> {
        if fork_step == 0 {
            return Err(MissionError::Validation(
                "fork step must be a positive integer".to_string(),
            ));
        }

        let parent = self.ledger.load(parent_id).await?;
        let prefix = self.ledger.collect_events(parent_id, Some(fork_step)).await?;

        let Some(branch_from_step) = prefix.iter().map(|e| e.step).max() else {
            return Err(MissionError::NotForkable {
                mission_id: parent_id,
                fork_step,
            });
        };

        let projection = MissionProjection::fold(&prefix, self.ledger.schedule());
        let fork = Mission::forked_from(&parent, branch_from_step, projection);
        let copies: Vec<NewStepEvent> = prefix
            .iter()
            .map(|event| NewStepEvent::copy_of(event, fork.id))
            .collect();

        self.ledger.create(&fork, &copies).await?;

        metrics::counter!("missionlog_forks_total").increment(1);
        info!(
            mission_id = %fork.id,
            parent_mission_id = %parent_id,
            requested_step = fork_step,
            branch_from_step,
            copied = copies.len(),
            "Forked mission"
        );
        self.ledger.event_bus().publish(MissionLifecycleEvent::MissionForked {
            mission_id: fork.id,
            parent_mission_id: parent_id,
            branch_from_step,
            forked_at: Utc::now(),
        });

        Ok(fork)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mission::{MissionStatus, RunMode};
    use crate::domain::repository::{EventQuery, EventRepository, MissionRepository};
    use crate::domain::schedule::StepSchedule;
    use crate::domain::step_event::{Provenance, StepEvent};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::InMemoryMissionStore;
    use std::time::Duration;

    async fn seeded(store: &Arc<InMemoryMissionStore>, upto: u32) -> Mission {
        let schedule = StepSchedule::standard();
        let mut mission = Mission::new(Some("Parent".to_string()), RunMode::Generated);
        let seeds: Vec<NewStepEvent> = (1..=upto)
            .map(|step| {
                let slot = schedule.slot(step).unwrap();
                NewStepEvent::new(
                    mission.id,
                    step,
                    slot.agent,
                    slot.kind,
                    format!("step {}", step),
                    serde_json::json!({"n": step}),
                    Provenance::Scripted,
                )
            })
            .collect();
        let events: Vec<StepEvent> = seeds.iter().cloned().map(StepEvent::from_new).collect();
        mission.set_projection(MissionProjection::fold(&events, &schedule));
        store.create(&mission, &seeds).await.unwrap();
        mission
    }

    fn fork_engine(store: Arc<InMemoryMissionStore>) -> ForkEngine {
        ForkEngine::new(Arc::new(MissionLedger::new(
            store,
            Arc::new(StepSchedule::standard()),
            EventBus::new(16),
            Duration::from_secs(5),
        )))
    }

    #[tokio::test]
    async fn test_fork_clamps_to_last_recorded_step() {
        let store = Arc::new(InMemoryMissionStore::new());
        let parent = seeded(&store, 13).await;

        let fork = fork_engine(store.clone()).fork(parent.id, 20).await.unwrap();

        assert_eq!(fork.current_step, 13);
        assert_eq!(fork.status, MissionStatus::Running);
        assert_eq!(fork.title, "Parent (fork @ 13)");
        let lineage = fork.lineage.clone().unwrap();
        assert_eq!(lineage.parent_mission_id, parent.id);
        assert_eq!(lineage.branch_from_step, 13);
        assert_eq!(fork.artifacts.checkpoint_step, Some(13));
        assert_eq!(fork.artifacts.latest_summary, parent.artifacts.latest_summary);
        assert_eq!(fork.last_checkpoint_at, parent.last_checkpoint_at);

        let parent_events = store.list(parent.id, EventQuery::first_page()).await.unwrap();
        let fork_events = store.list(fork.id, EventQuery::first_page()).await.unwrap();
        assert_eq!(parent_events.len(), fork_events.len());
        for (p, f) in parent_events.iter().zip(&fork_events) {
            assert_ne!(p.id, f.id);
            assert_eq!(f.mission_id, fork.id);
            assert_eq!((p.step, p.agent, p.kind), (f.step, f.agent, f.kind));
            assert_eq!((&p.summary, &p.payload, p.ts, p.provenance), (&f.summary, &f.payload, f.ts, f.provenance));
        }
    }

    #[tokio::test]
    async fn test_fork_of_done_parent_is_running() {
        let store = Arc::new(InMemoryMissionStore::new());
        let parent = seeded(&store, 17).await;
        assert_eq!(parent.status, MissionStatus::Done);

        let fork = fork_engine(store.clone()).fork(parent.id, 17).await.unwrap();
        assert_eq!(fork.status, MissionStatus::Running);
        assert_eq!(fork.current_step, 17);

        let stored = store.find_by_id(fork.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Running);
    }

    #[tokio::test]
    async fn test_fork_rejects_zero_and_empty_prefix() {
        let store = Arc::new(InMemoryMissionStore::new());
        let empty = Mission::new(None, RunMode::Generated);
        store.create(&empty, &[]).await.unwrap();
        let engine = fork_engine(store);

        assert!(matches!(
            engine.fork(empty.id, 0).await,
            Err(MissionError::Validation(_))
        ));
        assert!(matches!(
            engine.fork(empty.id, 3).await,
            Err(MissionError::NotForkable { fork_step: 3, .. })
        ));
        assert!(matches!(
            engine.fork(MissionId::new(), 3).await,
            Err(MissionError::NotFound(_))
        ));
    }
}
