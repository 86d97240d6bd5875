// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mission Ledger
//!
//! Store access shared by the tick engine, fork engine, mission service and
//! recovery. Every store call goes through here so that each one is bounded
//! by the configured timeout, appends are counted and published, and the
//! cached aggregate is updated with the same projection rule everywhere.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Bounded store access, append bookkeeping, projection writes

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::application::errors::MissionError;
use crate::domain::events::MissionLifecycleEvent;
use crate::domain::mission::{Mission, MissionId, MissionStatus};
use crate::domain::repository::{
    EventQuery, MissionStore, RepositoryError, MAX_EVENTS_PER_PAGE,
};
use crate::domain::schedule::StepSchedule;
use crate::domain::step_event::{AppendOutcome, NewStepEvent, StepEvent};
use crate::infrastructure::event_bus::EventBus;

pub struct MissionLedger {
    store: Arc<dyn MissionStore>,
    schedule: Arc<StepSchedule>,
    event_bus: EventBus,
    store_timeout: Duration,
}

impl MissionLedger {
    pub fn new(
        store: Arc<dyn MissionStore>,
        schedule: Arc<StepSchedule>,
        event_bus: EventBus,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            schedule,
            event_bus,
            store_timeout,
        }
    }

    pub fn schedule(&self) -> &StepSchedule {
        &self.schedule
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, MissionError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(MissionError::from),
            Err(_) => Err(MissionError::StorageTimeout(self.store_timeout)),
        }
    }

    pub async fn load(&self, id: MissionId) -> Result<Mission, MissionError> {
        self.bounded(self.store.find_by_id(id))
            .await?
            .ok_or(MissionError::NotFound(id))
    }

    pub async fn create(&self, mission: &Mission, seed_events: &[NewStepEvent]) -> Result<(), MissionError> {
        self.bounded(self.store.create(mission, seed_events)).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Mission>, MissionError> {
        self.bounded(self.store.find_recent(limit)).await
    }

    pub async fn find_event(&self, id: MissionId, step: u32) -> Result<Option<StepEvent>, MissionError> {
        self.bounded(self.store.find(id, step)).await
    }

    pub async fn page(&self, id: MissionId, query: EventQuery) -> Result<Vec<StepEvent>, MissionError> {
        self.bounded(self.store.list(id, query)).await
    }

    /// All events with `step <= max_step` (or the whole log), ascending,
    /// fetched page by page.
    pub async fn collect_events(&self, id: MissionId, max_step: Option<u32>) -> Result<Vec<StepEvent>, MissionError> {
        let mut events: Vec<StepEvent> = Vec::new();
        let mut query = EventQuery {
            max_step,
            ..EventQuery::first_page()
        };

        loop {
            let page = self.bounded(self.store.list(id, query)).await?;
            let full_page = page.len() == MAX_EVENTS_PER_PAGE;
            let last_step = page.last().map(|e| e.step);
            events.extend(page);

            match last_step {
                Some(step) if full_page => query = query.after(step),
                _ => break,
            }
        }

        Ok(events)
    }

    /// Summaries of the last `window` steps up to and including `through_step`,
    /// oldest first.
    pub async fn recent_summaries(
        &self,
        id: MissionId,
        through_step: u32,
        window: usize,
    ) -> Result<Vec<String>, MissionError> {
        if window == 0 || through_step == 0 {
            return Ok(Vec::new());
        }
        let window = window.min(MAX_EVENTS_PER_PAGE);
        let query = EventQuery {
            max_step: Some(through_step),
            after_step: Some(through_step.saturating_sub(window as u32)),
            limit: window,
        };
        let events = self.bounded(self.store.list(id, query)).await?;
        Ok(events.into_iter().map(|e| e.summary).collect())
    }

    /// Idempotent append. Inserted events are counted and published.
    pub async fn append(&self, event: NewStepEvent) -> Result<AppendOutcome, MissionError> {
        let mission_id = event.mission_id;
        let step = event.step;
        let outcome = self
            .bounded(self.store.append(event))
            .await
            .map_err(|e| match e {
                MissionError::Storage(RepositoryError::NotFound(_)) => MissionError::NotFound(mission_id),
                other => other,
            })?;

        match &outcome {
            AppendOutcome::Inserted(stored) => {
                metrics::counter!(
                    "missionlog_events_appended_total",
                    "provenance" => stored.provenance.as_str()
                )
                .increment(1);
                debug!(mission_id = %mission_id, step, kind = %stored.kind, "Appended step event");
                self.event_bus.publish(MissionLifecycleEvent::StepRecorded {
                    mission_id,
                    event: stored.clone(),
                });
            }
            AppendOutcome::AlreadyExists(_) => {
                debug!(mission_id = %mission_id, step, "Step already recorded");
            }
        }

        Ok(outcome)
    }

    /// Fold `event` into `mission` and persist the result if anything changed.
    /// `mission` is replaced with the stored, merged aggregate.
    pub async fn project(&self, mission: &mut Mission, event: &StepEvent) -> Result<(), MissionError> {
        let was_done = mission.status == MissionStatus::Done;
        if !mission.apply(event, &self.schedule) {
            return Ok(());
        }
        self.save_projection(mission).await?;

        if !was_done && mission.status == MissionStatus::Done {
            info!(mission_id = %mission.id, step = mission.current_step, "Mission completed");
            self.event_bus.publish(MissionLifecycleEvent::MissionCompleted {
                mission_id: mission.id,
                status: mission.status,
                completed_at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Monotone merge of `mission` into the stored row; `mission` becomes the
    /// stored result.
    pub async fn save_projection(&self, mission: &mut Mission) -> Result<(), MissionError> {
        let id = mission.id;
        let stored = self
            .bounded(self.store.save_projection(mission))
            .await
            .map_err(|e| match e {
                MissionError::Storage(RepositoryError::NotFound(_)) => MissionError::NotFound(id),
                other => other,
            })?;
        *mission = stored;
        Ok(())
    }
}
