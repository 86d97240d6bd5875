// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the mission and event repository
//! abstractions defined in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve missions and their step logs
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresMissionStore** - `missions` + `mission_events` tables, unique
//!   on `(mission_id, step)`
//! - **InMemoryMissionStore** - single-lock HashMap/BTreeMap store for tests
//!   and development
//!
//! Both give the same append semantics: the first writer for a step wins and
//! every other writer gets `AppendOutcome::AlreadyExists` with the stored
//! event.

pub mod postgres_mission;

pub use postgres_mission::PostgresMissionStore;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::mission::{Mission, MissionId};
use crate::domain::repository::{
    EventQuery, EventRepository, MissionRepository, RepositoryError, MAX_RECENT_MISSIONS,
};
use crate::domain::step_event::{AppendOutcome, NewStepEvent, StepEvent};

#[derive(Default)]
struct StoreState {
    missions: HashMap<MissionId, Mission>,
    events: HashMap<MissionId, BTreeMap<u32, StepEvent>>,
}

#[derive(Clone, Default)]
pub struct InMemoryMissionStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryMissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionRepository for InMemoryMissionStore {
    async fn create(&self, mission: &Mission, seed_events: &[NewStepEvent]) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if state.missions.contains_key(&mission.id) {
            return Err(RepositoryError::AlreadyExists(format!("mission {}", mission.id)));
        }

        let mut log = BTreeMap::new();
        for seed in seed_events {
            let mut event = StepEvent::from_new(seed.clone());
            event.mission_id = mission.id;
            log.entry(event.step).or_insert(event);
        }

        state.missions.insert(mission.id, mission.clone());
        state.events.insert(mission.id, log);
        Ok(())
    }

    async fn find_by_id(&self, id: MissionId) -> Result<Option<Mission>, RepositoryError> {
        Ok(self.state.read().missions.get(&id).cloned())
    }

    async fn save_projection(&self, mission: &Mission) -> Result<Mission, RepositoryError> {
        let mut state = self.state.write();
        let stored = state
            .missions
            .get_mut(&mission.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("mission {}", mission.id)))?;
        stored.merge_projection(mission);
        Ok(stored.clone())
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        let state = self.state.read();
        let mut missions: Vec<Mission> = state.missions.values().cloned().collect();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        missions.truncate(limit.min(MAX_RECENT_MISSIONS));
        Ok(missions)
    }
}

#[async_trait]
impl EventRepository for InMemoryMissionStore {
    async fn append(&self, event: NewStepEvent) -> Result<AppendOutcome, RepositoryError> {
        let mut state = self.state.write();
        if !state.missions.contains_key(&event.mission_id) {
            return Err(RepositoryError::NotFound(format!("mission {}", event.mission_id)));
        }

        let log = state.events.entry(event.mission_id).or_default();
        if let Some(existing) = log.get(&event.step) {
            return Ok(AppendOutcome::AlreadyExists(existing.clone()));
        }

        let stored = StepEvent::from_new(event);
        log.insert(stored.step, stored.clone());
        Ok(AppendOutcome::Inserted(stored))
    }

    async fn list(&self, mission_id: MissionId, query: EventQuery) -> Result<Vec<StepEvent>, RepositoryError> {
        let state = self.state.read();
        let Some(log) = state.events.get(&mission_id) else {
            return Ok(Vec::new());
        };

        Ok(log
            .values()
            .filter(|event| query.matches(event.step))
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    async fn find(&self, mission_id: MissionId, step: u32) -> Result<Option<StepEvent>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .events
            .get(&mission_id)
            .and_then(|log| log.get(&step))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mission::{MissionStatus, RunMode};
    use crate::domain::repository::MAX_EVENTS_PER_PAGE;
    use crate::domain::step_event::{AgentRole, EventKind, Provenance};
    use futures::future::join_all;

    fn note(mission_id: MissionId, step: u32, summary: &str) -> NewStepEvent {
        NewStepEvent::new(
            mission_id,
            step,
            AgentRole::Researcher,
            EventKind::Note,
            summary,
            serde_json::json!({}),
            Provenance::Generated,
        )
    }

    async fn store_with_mission() -> (InMemoryMissionStore, Mission) {
        let store = InMemoryMissionStore::new();
        let mission = Mission::new(Some("Store test".to_string()), RunMode::Generated);
        store.create(&mission, &[]).await.unwrap();
        (store, mission)
    }

    #[tokio::test]
    async fn test_duplicate_append_returns_existing() {
        let (store, mission) = store_with_mission().await;

        let first = store.append(note(mission.id, 1, "first")).await.unwrap();
        assert!(first.is_inserted());

        let second = store.append(note(mission.id, 1, "second")).await.unwrap();
        match second {
            AppendOutcome::AlreadyExists(existing) => {
                assert_eq!(existing.summary, "first");
                assert_eq!(existing.id, first.event().id);
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_appends_persist_exactly_one() {
        let (store, mission) = store_with_mission().await;

        let attempts = (0..16).map(|i| {
            let store = store.clone();
            let event = note(mission.id, 4, &format!("writer {}", i));
            async move { store.append(event).await }
        });
        let outcomes: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_inserted()).count(), 1);
        let winner = outcomes.iter().find(|o| o.is_inserted()).unwrap().event().id;
        assert!(outcomes.iter().all(|o| o.event().id == winner));

        let log = store.list(mission.id, EventQuery::first_page()).await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_paged() {
        let (store, mission) = store_with_mission().await;
        for step in [5, 2, 9, 1, 3] {
            store.append(note(mission.id, step, "n")).await.unwrap();
        }

        let steps: Vec<u32> = store
            .list(mission.id, EventQuery::first_page())
            .await
            .unwrap()
            .iter()
            .map(|e| e.step)
            .collect();
        assert_eq!(steps, vec![1, 2, 3, 5, 9]);

        let window: Vec<u32> = store
            .list(mission.id, EventQuery::up_to(5).after(1))
            .await
            .unwrap()
            .iter()
            .map(|e| e.step)
            .collect();
        assert_eq!(window, vec![2, 3, 5]);
    }

    #[tokio::test]
    async fn test_list_caps_page_size() {
        let (store, mission) = store_with_mission().await;
        for step in 1..=(MAX_EVENTS_PER_PAGE as u32 + 10) {
            store.append(note(mission.id, step, "n")).await.unwrap();
        }
        let page = store
            .list(
                mission.id,
                EventQuery {
                    limit: 1_000,
                    ..EventQuery::first_page()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), MAX_EVENTS_PER_PAGE);
    }

    #[tokio::test]
    async fn test_append_to_unknown_mission_fails() {
        let store = InMemoryMissionStore::new();
        let err = store.append(note(MissionId::new(), 1, "orphan")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_projection_merges_monotonically() {
        let (store, mut mission) = store_with_mission().await;
        mission.current_step = 17;
        mission.status = MissionStatus::Done;
        store.save_projection(&mission).await.unwrap();

        let mut stale = mission.clone();
        stale.current_step = 3;
        stale.status = MissionStatus::Running;
        let stored = store.save_projection(&stale).await.unwrap();

        assert_eq!(stored.current_step, 17);
        assert_eq!(stored.status, MissionStatus::Done);
    }

    #[tokio::test]
    async fn test_find_recent_newest_first() {
        let store = InMemoryMissionStore::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut mission = Mission::new(Some(format!("m{}", i)), RunMode::Scripted);
            mission.created_at += chrono::Duration::seconds(i);
            store.create(&mission, &[]).await.unwrap();
            ids.push(mission.id);
        }

        let recent = store.find_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, ids[2]);
        assert_eq!(recent[1].id, ids[1]);
    }
}
