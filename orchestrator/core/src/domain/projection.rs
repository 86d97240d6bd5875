// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Projection
//!
//! Pure fold from an ordered event log to the mission's summary state. The
//! persisted aggregate is only ever a cache of this fold, so recovery is
//! always "re-run the fold over the full log".
//!
//! Rules, applied per event:
//!
//! - `current_step = max(current_step, step)`
//! - `checkpoint` → `last_checkpoint_at = ts`, `latest_summary` = the
//!   payload's `checkpoint.summary` override, or the event summary
//! - `done` kind or the schedule's terminal step → `status = done`
//!
//! Checkpoint fields only move forward in step order, so applying events
//! incrementally in any arrival order yields the same result as folding them
//! sorted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::mission::{MissionArtifacts, MissionStatus};
use crate::domain::schedule::StepSchedule;
use crate::domain::step_event::{EventKind, StepEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionProjection {
    pub status: MissionStatus,
    pub current_step: u32,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub artifacts: MissionArtifacts,
}

impl MissionProjection {
    pub fn initial() -> Self {
        Self {
            status: MissionStatus::Running,
            current_step: 0,
            last_checkpoint_at: None,
            artifacts: MissionArtifacts::default(),
        }
    }

    /// Apply one event. Returns whether anything changed.
    pub fn apply(&mut self, event: &StepEvent, schedule: &StepSchedule) -> bool {
        let before = self.clone();

        self.current_step = self.current_step.max(event.step);

        if event.kind == EventKind::Checkpoint
            && self
                .artifacts
                .checkpoint_step
                .is_none_or(|applied| event.step >= applied)
        {
            self.last_checkpoint_at = Some(event.ts);
            self.artifacts.latest_summary = Some(
                event
                    .checkpoint_override()
                    .unwrap_or(&event.summary)
                    .to_string(),
            );
            self.artifacts.checkpoint_step = Some(event.step);
        }

        if schedule.completes(event) {
            self.status = MissionStatus::Done;
        }

        *self != before
    }

    pub fn fold<'a>(
        events: impl IntoIterator<Item = &'a StepEvent>,
        schedule: &StepSchedule,
    ) -> Self {
        let mut projection = Self::initial();
        for event in events {
            projection.apply(event, schedule);
        }
        projection
    }
}

impl Default for MissionProjection {
    fn default() -> Self {
        Self::initial()
    }
}
