// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scripted Driver
//!
//! Background tasks that walk `scripted` missions through the schedule with
//! default content, one `emit_event` per interval.
//!
//! The task map only prevents obviously redundant tasks. Two drivers on the
//! same mission (another process, a restarted daemon) are harmless: the
//! second emit of a step reports `AlreadyExists` and both move on.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::mission_service::{EmitEvent, MissionService};
use crate::domain::content::{DefaultContent, DefaultContentProvider};
use crate::domain::mission::{MissionId, RunMode};
use crate::domain::schedule::StepSchedule;
use crate::domain::step_event::Provenance;

type TaskMap = Arc<Mutex<HashMap<MissionId, JoinHandle<()>>>>;

pub struct ScriptedDriver {
    service: Arc<dyn MissionService>,
    schedule: Arc<StepSchedule>,
    defaults: Arc<dyn DefaultContentProvider>,
    interval: Duration,
    tasks: TaskMap,
}

impl ScriptedDriver {
    pub fn new(
        service: Arc<dyn MissionService>,
        schedule: Arc<StepSchedule>,
        defaults: Arc<dyn DefaultContentProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            schedule,
            defaults,
            interval,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start driving `mission_id` unless a task for it is already running.
    pub fn launch(&self, mission_id: MissionId) {
        let mut tasks = self.tasks.lock();
        if tasks.get(&mission_id).is_some_and(|handle| !handle.is_finished()) {
            debug!(mission_id = %mission_id, "Scripted driver already running");
            return;
        }

        let service = self.service.clone();
        let schedule = self.schedule.clone();
        let defaults = self.defaults.clone();
        let interval = self.interval;
        let registry = self.tasks.clone();

        let handle = tokio::spawn(async move {
            drive(service, schedule, defaults, interval, mission_id).await;
            registry.lock().remove(&mission_id);
        });
        tasks.insert(mission_id, handle);
    }

    /// Relaunch drivers for scripted missions that were still running when
    /// the process last stopped.
    pub async fn resume(&self) -> usize {
        let missions = match self.service.list_missions().await {
            Ok(missions) => missions,
            Err(e) => {
                warn!(error = %e, "Could not list missions to resume scripted drivers");
                return 0;
            }
        };

        let mut resumed = 0;
        for mission in missions
            .into_iter()
            .filter(|m| m.run_mode == RunMode::Scripted && m.is_running())
        {
            self.launch(mission.id);
            resumed += 1;
        }
        if resumed > 0 {
            info!(count = resumed, "Resumed scripted missions");
        }
        resumed
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for (mission_id, handle) in tasks.drain() {
            debug!(mission_id = %mission_id, "Stopping scripted driver");
            handle.abort();
        }
    }
}

impl Drop for ScriptedDriver {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn drive(
    service: Arc<dyn MissionService>,
    schedule: Arc<StepSchedule>,
    defaults: Arc<dyn DefaultContentProvider>,
    interval: Duration,
    mission_id: MissionId,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let mission = match service.get_mission(mission_id).await {
            Ok(mission) => mission,
            Err(e) if e.is_transient() => {
                warn!(mission_id = %mission_id, error = %e, "Scripted driver read failed; retrying");
                continue;
            }
            Err(e) => {
                warn!(mission_id = %mission_id, error = %e, "Scripted driver stopping");
                return;
            }
        };

        if !mission.is_running() {
            debug!(mission_id = %mission_id, status = %mission.status, "Scripted mission settled");
            return;
        }

        let Some((next, slot)) = mission
            .current_step
            .checked_add(1)
            .and_then(|next| schedule.slot(next).map(|slot| (next, slot)))
        else {
            debug!(mission_id = %mission_id, step = mission.current_step, "Schedule exhausted");
            return;
        };
        let content = defaults
            .content_for(next)
            .unwrap_or_else(|| DefaultContent::generic(next, slot));

        let request = EmitEvent {
            mission_id,
            step: next,
            agent: slot.agent,
            kind: slot.kind,
            summary: content.summary,
            payload: content.payload,
            provenance: Provenance::Scripted,
        };

        match service.emit_event(request).await {
            Ok(outcome) => {
                debug!(mission_id = %mission_id, step = outcome.event().step, "Scripted step emitted");
            }
            Err(e) if e.is_transient() => {
                warn!(mission_id = %mission_id, step = next, error = %e, "Scripted emit failed; retrying");
            }
            Err(e) => {
                warn!(mission_id = %mission_id, step = next, error = %e, "Scripted driver stopping");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::MissionLedger;
    use crate::application::mission_service::{StandardMissionService, StartMission};
    use crate::application::tick_engine::{TickEngine, TickSettings};
    use crate::domain::content::StandardDefaultContent;
    use crate::domain::mission::MissionStatus;
    use crate::domain::step_event::{AgentRole, EventKind, MAX_STEP};
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::InMemoryMissionStore;

    fn wiring() -> (Arc<dyn MissionService>, ScriptedDriver) {
        let schedule = Arc::new(StepSchedule::standard());
        let ledger = Arc::new(MissionLedger::new(
            Arc::new(InMemoryMissionStore::new()),
            schedule.clone(),
            EventBus::new(64),
            Duration::from_secs(5),
        ));
        let defaults: Arc<dyn DefaultContentProvider> = Arc::new(StandardDefaultContent);
        let tick_engine = Arc::new(TickEngine::new(
            ledger.clone(),
            None,
            None,
            defaults.clone(),
            TickSettings::default(),
        ));
        let service: Arc<dyn MissionService> =
            Arc::new(StandardMissionService::new(ledger, tick_engine, defaults.clone()));
        let driver = ScriptedDriver::new(service.clone(), schedule, defaults, Duration::from_millis(100));
        (service, driver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_mission_runs_to_done() {
        let (service, driver) = wiring();
        let id = service.start(StartMission::default()).await.unwrap();

        driver.launch(id);
        driver.launch(id);
        assert_eq!(driver.active_count(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;

        let view = service.get_mission_with_events(id).await.unwrap();
        assert_eq!(view.mission.status, MissionStatus::Done);
        assert_eq!(view.mission.current_step, 17);
        assert_eq!(view.events.len(), 17);
        assert!(view.events.iter().all(|e| e.provenance == Provenance::Scripted));
        assert_eq!(view.events[16].kind, EventKind::Done);
        assert_eq!(driver.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_only_picks_running_scripted() {
        let (service, driver) = wiring();
        service.start(StartMission::default()).await.unwrap();
        service
            .start(StartMission {
                title: None,
                run_mode: RunMode::Generated,
            })
            .await
            .unwrap();

        assert_eq!(driver.resume().await, 1);
        driver.stop_all();
        assert_eq!(driver.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_stops_at_step_ceiling() {
        let (service, driver) = wiring();
        let id = service.start(StartMission::default()).await.unwrap();
        service
            .emit_event(EmitEvent {
                mission_id: id,
                step: MAX_STEP,
                agent: AgentRole::Reviewer,
                kind: EventKind::Note,
                summary: "Jumped to the last step".to_string(),
                payload: serde_json::json!({}),
                provenance: Provenance::Scripted,
            })
            .await
            .unwrap();

        driver.launch(id);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(driver.active_count(), 0);
        let mission = service.get_mission(id).await.unwrap();
        assert_eq!(mission.current_step, MAX_STEP);
        assert_eq!(mission.status, MissionStatus::Running);
    }
}
