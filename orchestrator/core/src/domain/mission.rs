// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Aggregate
//!
//! A mission is one run of the multi-agent process. Its event log is the
//! source of truth; the fields here (`status`, `current_step`,
//! `last_checkpoint_at`, `artifacts`) are a cached projection of that log
//! that may lag behind it but never diverge from it.
//!
//! ## Lifecycle
//!
//! ```text
//! running ──(done kind or terminal step)──▶ done
//! running ──(external)────────────────────▶ failed
//! ```
//!
//! `done` is terminal. A `fail` event never fails the mission by itself; the
//! schedule follows it with a `retry`.
//!
//! ## Forks
//!
//! A forked mission carries a [`MissionLineage`] pointing at its parent and
//! the step it branched from. After creation it is fully independent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::projection::MissionProjection;
use crate::domain::schedule::StepSchedule;
use crate::domain::step_event::StepEvent;

pub const DEFAULT_MISSION_TITLE: &str = "Untitled mission";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(pub Uuid);

impl MissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(MissionId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Running,
    Done,
    Failed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Running => "running",
            MissionStatus::Done => "done",
            MissionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(MissionStatus::Running),
            "done" => Ok(MissionStatus::Done),
            "failed" => Ok(MissionStatus::Failed),
            other => Err(format!("unknown mission status: '{}'", other)),
        }
    }
}

/// How a mission is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Driven through the schedule with canned content.
    #[default]
    Scripted,
    /// Advanced one tick at a time with generated content.
    Generated,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Scripted => "scripted",
            RunMode::Generated => "generated",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scripted" => Ok(RunMode::Scripted),
            "generated" => Ok(RunMode::Generated),
            other => Err(format!("unknown run mode: '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_summary: Option<String>,

    /// Step of the checkpoint that produced `latest_summary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_step: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionLineage {
    pub parent_mission_id: MissionId,
    pub branch_from_step: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    pub status: MissionStatus,
    pub current_step: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub artifacts: MissionArtifacts,
    pub lineage: Option<MissionLineage>,
    pub run_mode: RunMode,
}

impl Mission {
    /// A fresh running mission with no events applied. Blank titles fall back
    /// to [`DEFAULT_MISSION_TITLE`].
    pub fn new(title: Option<String>, run_mode: RunMode) -> Self {
        let now = Utc::now();
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_MISSION_TITLE.to_string());

        Self {
            id: MissionId::new(),
            title,
            status: MissionStatus::Running,
            current_step: 0,
            created_at: now,
            updated_at: now,
            last_checkpoint_at: None,
            artifacts: MissionArtifacts::default(),
            lineage: None,
            run_mode,
        }
    }

    /// A new mission branched from `parent` whose projection is `projection`.
    /// The fork is always running, whatever the copied prefix folds to.
    pub fn forked_from(parent: &Mission, branch_from_step: u32, projection: MissionProjection) -> Self {
        let mut fork = Mission::new(
            Some(format!("{} (fork @ {})", parent.title, branch_from_step)),
            parent.run_mode,
        );
        fork.set_projection(projection);
        fork.status = MissionStatus::Running;
        fork.lineage = Some(MissionLineage {
            parent_mission_id: parent.id,
            branch_from_step,
        });
        fork
    }

    pub fn is_running(&self) -> bool {
        self.status == MissionStatus::Running
    }

    pub fn is_fork(&self) -> bool {
        self.lineage.is_some()
    }

    pub fn projection(&self) -> MissionProjection {
        MissionProjection {
            status: self.status,
            current_step: self.current_step,
            last_checkpoint_at: self.last_checkpoint_at,
            artifacts: self.artifacts.clone(),
        }
    }

    pub fn set_projection(&mut self, projection: MissionProjection) {
        self.status = projection.status;
        self.current_step = projection.current_step;
        self.last_checkpoint_at = projection.last_checkpoint_at;
        self.artifacts = projection.artifacts;
    }

    /// Apply one event incrementally. Returns whether any field changed.
    ///
    /// A fork's copied prefix is already in its projection, so events at or
    /// before the branch point are ignored; they never complete the fork.
    pub fn apply(&mut self, event: &StepEvent, schedule: &StepSchedule) -> bool {
        if self
            .lineage
            .is_some_and(|lineage| event.step <= lineage.branch_from_step)
        {
            return false;
        }

        let mut projection = self.projection();
        if !projection.apply(event, schedule) {
            return false;
        }
        self.set_projection(projection);
        self.updated_at = Utc::now();
        true
    }

    /// Merge a newer view of this mission into `self` without regressing it:
    /// `current_step` never decreases, `done` is never left, and the
    /// checkpoint artifact only moves to an equal or later checkpoint step.
    pub fn merge_projection(&mut self, incoming: &Mission) {
        self.current_step = self.current_step.max(incoming.current_step);

        if self.status != MissionStatus::Done {
            self.status = incoming.status;
        }

        if incoming.artifacts.checkpoint_step >= self.artifacts.checkpoint_step {
            self.last_checkpoint_at = incoming.last_checkpoint_at;
            self.artifacts = incoming.artifacts.clone();
        }

        self.updated_at = self.updated_at.max(incoming.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::step_event::{AgentRole, EventKind, NewStepEvent, Provenance};

    fn event(mission: &Mission, step: u32, kind: EventKind, summary: &str) -> StepEvent {
        StepEvent::from_new(NewStepEvent::new(
            mission.id,
            step,
            AgentRole::Planner,
            kind,
            summary,
            serde_json::json!({}),
            Provenance::Scripted,
        ))
    }

    #[test]
    fn test_new_mission_defaults() {
        let mission = Mission::new(Some("   ".to_string()), RunMode::Generated);
        assert_eq!(mission.title, DEFAULT_MISSION_TITLE);
        assert_eq!(mission.status, MissionStatus::Running);
        assert_eq!(mission.current_step, 0);
        assert!(mission.lineage.is_none());
    }

    #[test]
    fn test_apply_reports_changes() {
        let schedule = StepSchedule::standard();
        let mut mission = Mission::new(Some("Launch".to_string()), RunMode::Scripted);

        assert!(mission.apply(&event(&mission, 1, EventKind::Plan, "Plan"), &schedule));
        assert_eq!(mission.current_step, 1);
        // Re-applying an older step changes nothing.
        assert!(!mission.apply(&event(&mission, 1, EventKind::Plan, "Plan"), &schedule));
    }

    #[test]
    fn test_merge_never_regresses() {
        let mut stored = Mission::new(Some("Launch".to_string()), RunMode::Generated);
        stored.current_step = 17;
        stored.status = MissionStatus::Done;
        stored.artifacts.latest_summary = Some("Final review".to_string());
        stored.artifacts.checkpoint_step = Some(13);

        let mut stale = stored.clone();
        stale.current_step = 7;
        stale.status = MissionStatus::Running;
        stale.artifacts.latest_summary = Some("Research done".to_string());
        stale.artifacts.checkpoint_step = Some(6);

        stored.merge_projection(&stale);
        assert_eq!(stored.current_step, 17);
        assert_eq!(stored.status, MissionStatus::Done);
        assert_eq!(stored.artifacts.latest_summary.as_deref(), Some("Final review"));
    }

    #[test]
    fn test_fork_title_and_lineage() {
        let mut parent = Mission::new(Some("Launch".to_string()), RunMode::Generated);
        parent.status = MissionStatus::Done;

        let mut projection = MissionProjection::initial();
        projection.current_step = 13;
        projection.status = MissionStatus::Done;

        let fork = Mission::forked_from(&parent, 13, projection);
        assert_eq!(fork.title, "Launch (fork @ 13)");
        assert_eq!(fork.status, MissionStatus::Running);
        assert_eq!(fork.run_mode, RunMode::Generated);
        assert_eq!(
            fork.lineage,
            Some(MissionLineage {
                parent_mission_id: parent.id,
                branch_from_step: 13
            })
        );
    }

    #[test]
    fn test_fork_ignores_events_from_copied_prefix() {
        let schedule = StepSchedule::standard();
        let mut parent = Mission::new(Some("Launch".to_string()), RunMode::Generated);
        parent.status = MissionStatus::Done;

        let mut projection = MissionProjection::initial();
        projection.current_step = 17;
        projection.status = MissionStatus::Done;
        let mut fork = Mission::forked_from(&parent, 17, projection);

        assert!(!fork.apply(&event(&fork, 17, EventKind::Done, "Done"), &schedule));
        assert_eq!(fork.status, MissionStatus::Running);

        // Steps past the branch point still count.
        assert!(fork.apply(&event(&fork, 18, EventKind::Done, "Done again"), &schedule));
        assert_eq!(fork.status, MissionStatus::Done);
        assert_eq!(fork.current_step, 18);
    }
}
