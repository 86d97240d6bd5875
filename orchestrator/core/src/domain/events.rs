// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::mission::{MissionId, MissionStatus, RunMode};
use crate::domain::step_event::StepEvent;

/// Lifecycle notifications published on the in-process event bus.
///
/// These are observer hints only. The event store remains the source of
/// truth; a subscriber that lags simply refetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionLifecycleEvent {
    MissionStarted {
        mission_id: MissionId,
        title: String,
        run_mode: RunMode,
        started_at: DateTime<Utc>,
    },
    StepRecorded {
        mission_id: MissionId,
        event: StepEvent,
    },
    MissionForked {
        mission_id: MissionId,
        parent_mission_id: MissionId,
        branch_from_step: u32,
        forked_at: DateTime<Utc>,
    },
    MissionCompleted {
        mission_id: MissionId,
        status: MissionStatus,
        completed_at: DateTime<Utc>,
    },
}

impl MissionLifecycleEvent {
    pub fn mission_id(&self) -> MissionId {
        match self {
            MissionLifecycleEvent::MissionStarted { mission_id, .. }
            | MissionLifecycleEvent::StepRecorded { mission_id, .. }
            | MissionLifecycleEvent::MissionForked { mission_id, .. }
            | MissionLifecycleEvent::MissionCompleted { mission_id, .. } => *mission_id,
        }
    }
}
