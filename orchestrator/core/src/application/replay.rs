// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Replay
//!
//! Read-side, speed-controlled disclosure of an already-fetched event
//! snapshot. A session never touches the store: it only reveals history that
//! was persisted before the snapshot was taken.
//!
//! [`MissionViewer`] models the switch between live polling and replay for
//! an observer (the CLI `watch`/`replay` commands): while a replay is active
//! live snapshots are ignored, and leaving replay drops every piece of replay
//! state so the next live view starts from a fresh fetch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::application::mission_service::MissionWithEvents;
use crate::domain::mission::MissionId;
use crate::domain::step_event::{EventKind, StepEvent};

/// Pacing interval at 1x.
pub const BASE_INTERVAL: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplaySpeed {
    #[serde(rename = "0.5x")]
    Half,
    #[default]
    #[serde(rename = "1x")]
    Normal,
    #[serde(rename = "2x")]
    Double,
    #[serde(rename = "4x")]
    Quadruple,
    #[serde(rename = "8x")]
    Octuple,
}

impl ReplaySpeed {
    pub const ALL: [ReplaySpeed; 5] = [
        ReplaySpeed::Half,
        ReplaySpeed::Normal,
        ReplaySpeed::Double,
        ReplaySpeed::Quadruple,
        ReplaySpeed::Octuple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplaySpeed::Half => "0.5x",
            ReplaySpeed::Normal => "1x",
            ReplaySpeed::Double => "2x",
            ReplaySpeed::Quadruple => "4x",
            ReplaySpeed::Octuple => "8x",
        }
    }

    /// Delay between two reveals.
    pub fn interval(&self) -> Duration {
        match self {
            ReplaySpeed::Half => BASE_INTERVAL * 2,
            ReplaySpeed::Normal => BASE_INTERVAL,
            ReplaySpeed::Double => BASE_INTERVAL / 2,
            ReplaySpeed::Quadruple => BASE_INTERVAL / 4,
            ReplaySpeed::Octuple => BASE_INTERVAL / 8,
        }
    }
}

impl fmt::Display for ReplaySpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplaySpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['x', 'X']);
        ReplaySpeed::ALL
            .into_iter()
            .find(|speed| speed.as_str().trim_end_matches('x') == trimmed)
            .ok_or_else(|| {
                format!(
                    "unknown replay speed '{}', expected one of 0.5x, 1x, 2x, 4x, 8x",
                    s
                )
            })
    }
}

/// Progressive view over an immutable snapshot.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    events: Vec<StepEvent>,
    start: usize,
    revealed: usize,
}

impl ReplaySession {
    /// With `from_checkpoint`, playback starts at the last checkpoint in the
    /// snapshot (everything before it counts as already revealed). Without a
    /// checkpoint it starts at the beginning.
    pub fn new(mut snapshot: Vec<StepEvent>, from_checkpoint: bool) -> Self {
        snapshot.sort_by_key(|event| event.step);

        let start = if from_checkpoint {
            snapshot
                .iter()
                .rposition(|event| event.kind == EventKind::Checkpoint)
                .unwrap_or(0)
        } else {
            0
        };

        Self {
            events: snapshot,
            start,
            revealed: start,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn start_offset(&self) -> usize {
        self.start
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed
    }

    pub fn is_finished(&self) -> bool {
        self.revealed >= self.events.len()
    }

    pub fn restart(&mut self) {
        self.revealed = self.start;
    }

    /// Reveal the next event, if any.
    pub fn advance(&mut self) -> Option<&StepEvent> {
        let event = self.events.get(self.revealed)?;
        self.revealed += 1;
        Some(event)
    }

    pub fn revealed(&self) -> &[StepEvent] {
        &self.events[..self.revealed]
    }

    /// Reveal the remaining events one per `speed.interval()`, passing each
    /// to `on_reveal`. Returns how many were revealed.
    pub async fn play<F>(&mut self, speed: ReplaySpeed, mut on_reveal: F) -> usize
    where
        F: FnMut(&StepEvent),
    {
        let mut count = 0;
        while !self.is_finished() {
            tokio::time::sleep(speed.interval()).await;
            if let Some(event) = self.advance() {
                on_reveal(event);
                count += 1;
            }
        }
        count
    }
}

#[derive(Debug)]
enum ViewerMode {
    Live,
    Replay(ReplaySession),
}

/// Live/replay state of one observer of one mission.
#[derive(Debug)]
pub struct MissionViewer {
    mission_id: MissionId,
    live: Option<MissionWithEvents>,
    mode: ViewerMode,
}

impl MissionViewer {
    pub fn new(mission_id: MissionId) -> Self {
        Self {
            mission_id,
            live: None,
            mode: ViewerMode::Live,
        }
    }

    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    /// Whether the observer should be polling the store.
    pub fn is_polling(&self) -> bool {
        matches!(self.mode, ViewerMode::Live)
    }

    pub fn is_replaying(&self) -> bool {
        matches!(self.mode, ViewerMode::Replay(_))
    }

    /// Whether live mode has no snapshot and must fetch one.
    pub fn needs_refresh(&self) -> bool {
        self.is_polling() && self.live.is_none()
    }

    pub fn live(&self) -> Option<&MissionWithEvents> {
        self.live.as_ref()
    }

    /// Accept a polled snapshot. Ignored while replaying; returns whether it
    /// was taken.
    pub fn apply_live(&mut self, snapshot: MissionWithEvents) -> bool {
        if !self.is_polling() || snapshot.mission.id != self.mission_id {
            return false;
        }
        self.live = Some(snapshot);
        true
    }

    /// Suspend live polling and replay the current live snapshot. Returns
    /// `None` when there is nothing to replay yet.
    pub fn enter_replay(&mut self, from_checkpoint: bool) -> Option<&mut ReplaySession> {
        if self.is_replaying() {
            return self.replay_mut();
        }
        let events = self.live.as_ref()?.events.clone();
        self.mode = ViewerMode::Replay(ReplaySession::new(events, from_checkpoint));
        self.replay_mut()
    }

    pub fn replay_mut(&mut self) -> Option<&mut ReplaySession> {
        match &mut self.mode {
            ViewerMode::Replay(session) => Some(session),
            ViewerMode::Live => None,
        }
    }

    /// Back to live. Both the replay session and the pre-replay snapshot are
    /// dropped.
    pub fn exit_replay(&mut self) {
        self.mode = ViewerMode::Live;
        self.live = None;
    }
}
