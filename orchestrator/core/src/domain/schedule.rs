// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Step Schedule
//!
//! Static table mapping each step number to the agent role that acts and the
//! kind of event it records. The schedule is the single authority for "what
//! happens at step N"; it holds no per-mission state.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Step → (agent, kind) lookup, terminal step detection

use serde::{Deserialize, Serialize};

use crate::domain::step_event::{AgentRole, EventKind, StepEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub agent: AgentRole,
    pub kind: EventKind,
}

impl ScheduleSlot {
    pub const fn new(agent: AgentRole, kind: EventKind) -> Self {
        Self { agent, kind }
    }
}

const STANDARD_SLOTS: [ScheduleSlot; 17] = [
    ScheduleSlot::new(AgentRole::Planner, EventKind::Plan),
    ScheduleSlot::new(AgentRole::Planner, EventKind::Assign),
    ScheduleSlot::new(AgentRole::Researcher, EventKind::InvokeTool),
    ScheduleSlot::new(AgentRole::Researcher, EventKind::ToolResult),
    ScheduleSlot::new(AgentRole::Researcher, EventKind::Note),
    ScheduleSlot::new(AgentRole::Planner, EventKind::Checkpoint),
    ScheduleSlot::new(AgentRole::Executor, EventKind::InvokeTool),
    ScheduleSlot::new(AgentRole::Executor, EventKind::ToolResult),
    ScheduleSlot::new(AgentRole::Executor, EventKind::Fail),
    ScheduleSlot::new(AgentRole::Executor, EventKind::Retry),
    ScheduleSlot::new(AgentRole::Executor, EventKind::ToolResult),
    ScheduleSlot::new(AgentRole::Reviewer, EventKind::Note),
    ScheduleSlot::new(AgentRole::Reviewer, EventKind::Checkpoint),
    ScheduleSlot::new(AgentRole::Planner, EventKind::Assign),
    ScheduleSlot::new(AgentRole::Executor, EventKind::InvokeTool),
    ScheduleSlot::new(AgentRole::Reviewer, EventKind::Note),
    ScheduleSlot::new(AgentRole::Planner, EventKind::Done),
];

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule must contain at least one step")]
    Empty,
}

/// Ordered step table. Step `n` lives at index `n - 1`; the last entry is the
/// terminal step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSchedule {
    slots: Vec<ScheduleSlot>,
}

impl StepSchedule {
    /// The 17-step plan → research → execute → review → done cycle.
    pub fn standard() -> Self {
        Self {
            slots: STANDARD_SLOTS.to_vec(),
        }
    }

    pub fn new(slots: Vec<ScheduleSlot>) -> Result<Self, ScheduleError> {
        if slots.is_empty() {
            return Err(ScheduleError::Empty);
        }
        Ok(Self { slots })
    }

    /// Agent and kind for `step`, or `None` when the step is out of range.
    pub fn slot(&self, step: u32) -> Option<ScheduleSlot> {
        if step == 0 {
            return None;
        }
        self.slots.get(step as usize - 1).copied()
    }

    pub fn total_steps(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn terminal_step(&self) -> u32 {
        self.total_steps()
    }

    pub fn is_terminal(&self, step: u32) -> bool {
        step == self.terminal_step()
    }

    /// Whether recording `event` completes its mission.
    pub fn completes(&self, event: &StepEvent) -> bool {
        event.kind == EventKind::Done || self.is_terminal(event.step)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, ScheduleSlot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (idx as u32 + 1, *slot))
    }
}

impl Default for StepSchedule {
    fn default() -> Self {
        Self::standard()
    }
}
