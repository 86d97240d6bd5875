// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Step Events
//!
//! One immutable fact in a mission's log. Events are keyed by
//! `(mission_id, step)`; at most one event exists per step per mission and
//! the store, not the application, enforces that.
//!
//! Events are created once through an idempotent append and never mutated or
//! deleted. A duplicate append is reported as [`AppendOutcome::AlreadyExists`]
//! rather than as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::content::truncate_summary;
use crate::domain::mission::MissionId;

/// Highest step the log accepts. Steps are stored as SQL `INTEGER`.
pub const MAX_STEP: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Roles that may author an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Researcher,
    Executor,
    Reviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Researcher,
        AgentRole::Executor,
        AgentRole::Reviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Researcher => "researcher",
            AgentRole::Executor => "executor",
            AgentRole::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("agent", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Plan,
    Assign,
    InvokeTool,
    ToolResult,
    Checkpoint,
    Note,
    Fail,
    Retry,
    Done,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Plan,
        EventKind::Assign,
        EventKind::InvokeTool,
        EventKind::ToolResult,
        EventKind::Checkpoint,
        EventKind::Note,
        EventKind::Fail,
        EventKind::Retry,
        EventKind::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Plan => "plan",
            EventKind::Assign => "assign",
            EventKind::InvokeTool => "invoke_tool",
            EventKind::ToolResult => "tool_result",
            EventKind::Checkpoint => "checkpoint",
            EventKind::Note => "note",
            EventKind::Fail => "fail",
            EventKind::Retry => "retry",
            EventKind::Done => "done",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the hyphenated spelling used by older scripted drivers.
        let normalized = s.replace('-', "_");
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownVariant::new("kind", s))
    }
}

/// Which collaborator produced an event's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Scripted,
    Generated,
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Scripted => "scripted",
            Provenance::Generated => "generated",
            Provenance::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scripted" => Ok(Provenance::Scripted),
            "generated" => Ok(Provenance::Generated),
            "fallback" => Ok(Provenance::Fallback),
            other => Err(UnknownVariant::new("provenance", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field}: '{value}'")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub id: EventId,
    pub mission_id: MissionId,
    pub ts: DateTime<Utc>,
    pub step: u32,
    pub agent: AgentRole,
    pub kind: EventKind,
    pub summary: String,
    pub payload: serde_json::Value,
    pub provenance: Provenance,
}

impl StepEvent {
    /// Materialize a new event with a fresh identity.
    pub fn from_new(new: NewStepEvent) -> Self {
        Self {
            id: EventId::new(),
            mission_id: new.mission_id,
            ts: new.ts,
            step: new.step,
            agent: new.agent,
            kind: new.kind,
            summary: new.summary,
            payload: new.payload,
            provenance: new.provenance,
        }
    }

    /// Explicit checkpoint summary carried in the payload, if any.
    pub fn checkpoint_override(&self) -> Option<&str> {
        self.payload
            .get("checkpoint")
            .and_then(|c| c.get("summary"))
            .and_then(|s| s.as_str())
    }
}

/// Append request. Identity is assigned by the store on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStepEvent {
    pub mission_id: MissionId,
    pub ts: DateTime<Utc>,
    pub step: u32,
    pub agent: AgentRole,
    pub kind: EventKind,
    pub summary: String,
    pub payload: serde_json::Value,
    pub provenance: Provenance,
}

impl NewStepEvent {
    pub fn new(
        mission_id: MissionId,
        step: u32,
        agent: AgentRole,
        kind: EventKind,
        summary: impl Into<String>,
        payload: serde_json::Value,
        provenance: Provenance,
    ) -> Self {
        Self {
            mission_id,
            ts: Utc::now(),
            step,
            agent,
            kind,
            summary: summary.into(),
            payload,
            provenance,
        }
    }

    /// Verbatim copy of `event` into another mission's log (fork).
    pub fn copy_of(event: &StepEvent, mission_id: MissionId) -> Self {
        Self {
            mission_id,
            ts: event.ts,
            step: event.step,
            agent: event.agent,
            kind: event.kind,
            summary: event.summary.clone(),
            payload: event.payload.clone(),
            provenance: event.provenance,
        }
    }

    /// Reject malformed input before any persistence attempt.
    ///
    /// A `null` payload is normalized to an empty object and the summary is
    /// cut to the same length generated summaries are.
    pub fn validate(mut self) -> Result<Self, String> {
        if self.step == 0 {
            return Err("step must be a positive integer".to_string());
        }
        if self.step > MAX_STEP {
            return Err(format!("step must be at most {}", MAX_STEP));
        }
        self.summary = truncate_summary(&self.summary);
        if self.summary.is_empty() {
            return Err("summary must not be empty".to_string());
        }
        if self.payload.is_null() {
            self.payload = serde_json::json!({});
        }
        if !self.payload.is_object() {
            return Err("payload must be a JSON object".to_string());
        }
        Ok(self)
    }
}

/// Result of an idempotent append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The event was written.
    Inserted(StepEvent),
    /// Another writer already recorded this step; carries the stored event.
    AlreadyExists(StepEvent),
}

impl AppendOutcome {
    pub fn event(&self) -> &StepEvent {
        match self {
            AppendOutcome::Inserted(event) | AppendOutcome::AlreadyExists(event) => event,
        }
    }

    pub fn into_event(self) -> StepEvent {
        match self {
            AppendOutcome::Inserted(event) | AppendOutcome::AlreadyExists(event) => event,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendOutcome::Inserted(_))
    }
}
