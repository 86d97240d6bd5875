// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use missionlog_core::application::errors::MissionError;
use missionlog_core::application::mission_service::{MissionService, StartMission};
use missionlog_core::application::replay::{ReplaySession, ReplaySpeed};
use missionlog_core::application::repository_factory::build_runtime_with_store;
use missionlog_core::domain::config::MissionlogConfig;
use missionlog_core::domain::mission::{MissionId, MissionStatus, RunMode};
use missionlog_core::domain::repository::{EventQuery, EventRepository};
use missionlog_core::domain::step_event::EventKind;
use missionlog_core::infrastructure::repositories::InMemoryMissionStore;

async fn mission_at_step(service: &Arc<dyn MissionService>, step: u32) -> MissionId {
    let id = service
        .start(StartMission {
            title: Some("Migrate the index".to_string()),
            run_mode: RunMode::Generated,
        })
        .await
        .unwrap();
    for _ in 1..step {
        service.tick(id).await.unwrap();
    }
    id
}

#[tokio::test]
async fn test_fork_beyond_current_step_clamps_to_checkpoint() {
    let store = Arc::new(InMemoryMissionStore::new());
    let runtime = build_runtime_with_store(&MissionlogConfig::default(), store.clone(), None).unwrap();
    let service = runtime.mission_service.clone();

    let parent_id = mission_at_step(&service, 13).await;
    let parent = service.get_mission(parent_id).await.unwrap();
    assert_eq!(parent.current_step, 13);

    let fork_id = service.fork(parent_id, 20).await.unwrap();
    let fork = service.get_mission(fork_id).await.unwrap();

    assert_eq!(fork.current_step, 13);
    assert_eq!(fork.status, MissionStatus::Running);
    assert_eq!(fork.run_mode, RunMode::Generated);
    assert_eq!(fork.lineage.unwrap().branch_from_step, 13);
    assert_eq!(fork.last_checkpoint_at, parent.last_checkpoint_at);
    assert_eq!(fork.artifacts.latest_summary, parent.artifacts.latest_summary);

    let parent_events = store.list(parent_id, EventQuery::first_page()).await.unwrap();
    let fork_events = store.list(fork_id, EventQuery::first_page()).await.unwrap();
    assert_eq!(fork_events.len(), 13);
    for (p, f) in parent_events.iter().zip(&fork_events) {
        assert_ne!(p.id, f.id);
        assert_eq!(p.step, f.step);
        assert_eq!(p.summary, f.summary);
        assert_eq!(p.payload, f.payload);
        assert_eq!(p.ts, f.ts);
        assert_eq!(p.provenance, f.provenance);
    }
}

#[tokio::test]
async fn test_lineages_are_independent_after_fork() {
    let store = Arc::new(InMemoryMissionStore::new());
    let runtime = build_runtime_with_store(&MissionlogConfig::default(), store.clone(), None).unwrap();
    let service = runtime.mission_service.clone();

    let parent_id = mission_at_step(&service, 5).await;
    let fork_id = service.fork(parent_id, 3).await.unwrap();

    for _ in 0..14 {
        service.tick(fork_id).await.unwrap();
    }

    let fork = service.get_mission(fork_id).await.unwrap();
    assert_eq!(fork.status, MissionStatus::Done);
    assert_eq!(fork.current_step, 17);

    let parent = service.get_mission(parent_id).await.unwrap();
    assert_eq!(parent.current_step, 5);
    assert_eq!(parent.status, MissionStatus::Running);
    assert_eq!(store.list(parent_id, EventQuery::first_page()).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_fork_errors() {
    let runtime =
        build_runtime_with_store(&MissionlogConfig::default(), Arc::new(InMemoryMissionStore::new()), None)
            .unwrap();
    let service = runtime.mission_service.clone();

    assert!(matches!(
        service.fork(MissionId::new(), 4).await,
        Err(MissionError::NotFound(_))
    ));

    let id = mission_at_step(&service, 2).await;
    assert!(matches!(
        service.fork(id, 0).await,
        Err(MissionError::Validation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_replay_reveals_captured_snapshot() {
    let runtime =
        build_runtime_with_store(&MissionlogConfig::default(), Arc::new(InMemoryMissionStore::new()), None)
            .unwrap();
    let service = runtime.mission_service.clone();
    let id = mission_at_step(&service, 15).await;

    let snapshot = service.get_mission_with_events(id).await.unwrap().events;
    let mut session = ReplaySession::new(snapshot.clone(), false);

    let mut revealed = Vec::new();
    let count = session
        .play(ReplaySpeed::Octuple, |event| revealed.push(event.clone()))
        .await;
    assert_eq!(count, snapshot.len());
    assert_eq!(revealed, snapshot);

    // The live mission keeps moving; the session does not.
    service.tick(id).await.unwrap();
    assert_eq!(session.revealed_count(), 15);

    session.restart();
    assert_eq!(session.revealed_count(), 0);

    let mut from_checkpoint = ReplaySession::new(snapshot, true);
    assert_eq!(from_checkpoint.revealed().len(), from_checkpoint.start_offset());
    assert_eq!(from_checkpoint.advance().map(|e| e.kind), Some(EventKind::Checkpoint));
}
