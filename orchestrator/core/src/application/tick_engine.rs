// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tick Engine
//!
//! Advances a generated mission by exactly one step per call.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** schedule lookup → context ranking → content generation →
//!   idempotent append → projection
//!
//! The engine holds no locks. Two concurrent ticks on the same mission both
//! target `current_step + 1`; the store lets one of them win and the other
//! gets `Duplicate` carrying the winner's event. Generated content of the
//! loser is discarded.
//!
//! Collaborator failures (generator, ranker) are absorbed: they are logged,
//! counted, and replaced with deterministic fallbacks. Storage failures are
//! returned to the caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::errors::MissionError;
use crate::application::ledger::MissionLedger;
use crate::domain::content::{
    truncate_summary, ContentGenerator, DefaultContent, DefaultContentProvider, GeneratedContent,
    GenerationRequest, GeneratorError,
};
use crate::domain::mission::{Mission, MissionId, MissionStatus, RunMode};
use crate::domain::ranking::{most_recent, ContextRanker, RankerError};
use crate::domain::schedule::ScheduleSlot;
use crate::domain::step_event::{AppendOutcome, EventKind, NewStepEvent, Provenance, StepEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// This call recorded the next step.
    Advanced { event: StepEvent },
    /// The next step was already recorded, by this or another caller.
    Duplicate { event: StepEvent },
    /// Nothing to do: the mission is not running or the schedule is exhausted.
    Settled { status: MissionStatus },
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            TickOutcome::Advanced { .. } => "advanced",
            TickOutcome::Duplicate { .. } => "duplicate",
            TickOutcome::Settled { .. } => "settled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TickSettings {
    pub context_window: usize,
    pub top_k: usize,
    pub generator_timeout: Duration,
    pub ranker_timeout: Duration,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            context_window: 40,
            top_k: 6,
            generator_timeout: Duration::from_secs(8),
            ranker_timeout: Duration::from_secs(2),
        }
    }
}

pub struct TickEngine {
    ledger: Arc<MissionLedger>,
    generator: Option<Arc<dyn ContentGenerator>>,
    ranker: Option<Arc<dyn ContextRanker>>,
    defaults: Arc<dyn DefaultContentProvider>,
    settings: TickSettings,
}

impl TickEngine {
    pub fn new(
        ledger: Arc<MissionLedger>,
        generator: Option<Arc<dyn ContentGenerator>>,
        ranker: Option<Arc<dyn ContextRanker>>,
        defaults: Arc<dyn DefaultContentProvider>,
        settings: TickSettings,
    ) -> Self {
        Self {
            ledger,
            generator,
            ranker,
            defaults,
            settings,
        }
    }

    pub async fn tick(&self, mission_id: MissionId) -> Result<TickOutcome, MissionError> {
        let outcome = self.advance(mission_id).await?;
        metrics::counter!("missionlog_ticks_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn advance(&self, mission_id: MissionId) -> Result<TickOutcome, MissionError> {
        let mut mission = self.ledger.load(mission_id).await?;

        if mission.run_mode == RunMode::Scripted {
            return Err(MissionError::Validation(format!(
                "mission {} is scripted and cannot be ticked",
                mission_id
            )));
        }

        if !mission.is_running() {
            return Ok(TickOutcome::Settled {
                status: mission.status,
            });
        }

        let schedule = self.ledger.schedule();
        let Some(next) = mission.current_step.checked_add(1) else {
            return Ok(TickOutcome::Settled {
                status: mission.status,
            });
        };
        if next > schedule.total_steps() {
            return Ok(TickOutcome::Settled {
                status: MissionStatus::Done,
            });
        }

        let Some(slot) = schedule.slot(next) else {
            return Ok(TickOutcome::Settled {
                status: mission.status,
            });
        };

        // A lagging aggregate: the step exists, heal the cache with it.
        if let Some(existing) = self.ledger.find_event(mission_id, next).await? {
            debug!(mission_id = %mission_id, step = next, "Next step already recorded");
            self.ledger.project(&mut mission, &existing).await?;
            return Ok(TickOutcome::Duplicate { event: existing });
        }

        let candidates = self
            .ledger
            .recent_summaries(mission_id, mission.current_step, self.settings.context_window)
            .await?;
        let ranked_context = self.rank_context(&mission, next, slot, &candidates).await;

        let request = GenerationRequest {
            mission_title: mission.title.clone(),
            step: next,
            agent: slot.agent,
            kind: slot.kind,
            ranked_context,
        };
        let (summary, payload, provenance) = self.produce_content(&request, slot).await;

        let event = NewStepEvent::new(
            mission_id,
            next,
            slot.agent,
            slot.kind,
            summary,
            payload,
            provenance,
        );

        match self.ledger.append(event).await? {
            AppendOutcome::Inserted(stored) => {
                info!(
                    mission_id = %mission_id,
                    step = next,
                    kind = %stored.kind,
                    provenance = %stored.provenance,
                    "Mission advanced"
                );
                self.ledger.project(&mut mission, &stored).await?;
                Ok(TickOutcome::Advanced { event: stored })
            }
            AppendOutcome::AlreadyExists(winner) => {
                debug!(mission_id = %mission_id, step = next, "Lost append race; discarding generated content");
                self.ledger.project(&mut mission, &winner).await?;
                Ok(TickOutcome::Duplicate { event: winner })
            }
        }
    }

    async fn rank_context(
        &self,
        mission: &Mission,
        step: u32,
        slot: ScheduleSlot,
        candidates: &[String],
    ) -> Vec<String> {
        let top_k = self.settings.top_k;
        if candidates.len() <= top_k {
            return candidates.iter().rev().cloned().collect();
        }

        let Some(ranker) = &self.ranker else {
            return most_recent(candidates, top_k);
        };

        let query = format!("{} {} {} step {}", mission.title, slot.agent, slot.kind, step);
        let timeout = self.settings.ranker_timeout;
        let result = match tokio::time::timeout(timeout, ranker.rank(&query, candidates, top_k)).await {
            Ok(result) => result,
            Err(_) => Err(RankerError::Timeout(timeout.as_millis() as u64)),
        };

        match result {
            Ok(mut ranked) if !ranked.is_empty() => {
                ranked.truncate(top_k);
                ranked
            }
            Ok(_) => most_recent(candidates, top_k),
            Err(e) => {
                warn!(mission_id = %mission.id, step, error = %e, "Context ranker failed; using most recent summaries");
                metrics::counter!("missionlog_collaborator_fallback_total", "collaborator" => "ranker")
                    .increment(1);
                most_recent(candidates, top_k)
            }
        }
    }

    async fn produce_content(
        &self,
        request: &GenerationRequest,
        slot: ScheduleSlot,
    ) -> (String, serde_json::Value, Provenance) {
        if let Some(generator) = &self.generator {
            let timeout = self.settings.generator_timeout;
            let result = match tokio::time::timeout(timeout, generator.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout(timeout.as_millis() as u64)),
            };

            match result.and_then(|content| Self::shape_generated(content, slot.kind)) {
                Ok((summary, payload)) => return (summary, payload, Provenance::Generated),
                Err(e) => {
                    warn!(step = request.step, error = %e, "Content generator failed; using default content");
                }
            }
        }

        metrics::counter!("missionlog_collaborator_fallback_total", "collaborator" => "generator")
            .increment(1);
        let fallback = self
            .defaults
            .content_for(request.step)
            .unwrap_or_else(|| DefaultContent::generic(request.step, slot));
        (fallback.summary, fallback.payload, Provenance::Fallback)
    }

    /// The checkpoint artifact travels in the payload so the projection
    /// stays a function of stored events. Summaries are capped here for
    /// every generator; a blank one counts as malformed output.
    fn shape_generated(
        content: GeneratedContent,
        kind: EventKind,
    ) -> Result<(String, serde_json::Value), GeneratorError> {
        let summary = truncate_summary(&content.summary);
        if summary.is_empty() {
            return Err(GeneratorError::Malformed("blank summary".to_string()));
        }

        let mut payload = content.payload;
        if !payload.is_object() {
            payload = serde_json::json!({});
        }
        if kind == EventKind::Checkpoint {
            let artifact = content
                .checkpoint
                .map(|artifact| truncate_summary(&artifact.summary))
                .filter(|summary| !summary.is_empty());
            if let (Some(artifact), Some(map)) = (artifact, payload.as_object_mut()) {
                map.insert(
                    "checkpoint".to_string(),
                    serde_json::json!({ "summary": artifact }),
                );
            }
        }
        Ok((summary, payload))
    }
}
