// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content
//!
//! Contracts for producing the human-readable part of a step event.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** `ContentGenerator` collaborator interface and the
//!   deterministic `DefaultContentProvider` used when generation is
//!   unavailable

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::schedule::ScheduleSlot;
use crate::domain::step_event::{AgentRole, EventKind};

/// Longest summary stored for any step.
pub const MAX_SUMMARY_CHARS: usize = 160;

/// Trim `text` and cut it to at most [`MAX_SUMMARY_CHARS`] characters.
pub fn truncate_summary(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_SUMMARY_CHARS) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Everything a generator may look at when writing one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub mission_title: String,
    pub step: u32,
    pub agent: AgentRole,
    pub kind: EventKind,
    /// Most relevant prior summaries, best first.
    pub ranked_context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointArtifact {
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub summary: String,
    #[serde(default = "empty_object")]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointArtifact>,
}

fn empty_object() -> serde_json::Value {
    json!({})
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator timed out after {0} ms")]
    Timeout(u64),

    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("malformed generator output: {0}")]
    Malformed(String),
}

/// External content generator. Failures are always recoverable: the caller
/// falls back to [`DefaultContentProvider`].
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GeneratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultContent {
    pub summary: String,
    pub payload: serde_json::Value,
}

impl DefaultContent {
    /// Last-resort content for a slot the provider has no entry for.
    pub fn generic(step: u32, slot: ScheduleSlot) -> Self {
        Self {
            summary: format!("{} recorded {} at step {}", slot.agent, slot.kind, step),
            payload: json!({}),
        }
    }
}

/// Deterministic, dependency-free content for every scheduled step.
pub trait DefaultContentProvider: Send + Sync {
    fn content_for(&self, step: u32) -> Option<DefaultContent>;
}

/// Canned content for the standard 17-step schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDefaultContent;

impl DefaultContentProvider for StandardDefaultContent {
    fn content_for(&self, step: u32) -> Option<DefaultContent> {
        let (summary, payload) = match step {
            1 => (
                "Drafted a mission plan with research, execution and review phases",
                json!({"phases": ["research", "execute", "review"]}),
            ),
            2 => (
                "Assigned background research to the researcher",
                json!({"assignee": "researcher", "task": "background research"}),
            ),
            3 => (
                "Queried the knowledge base for prior art",
                json!({"tool": "search", "args": {"query": "prior art"}}),
            ),
            4 => (
                "Search returned five relevant sources",
                json!({"tool": "search", "result_count": 5}),
            ),
            5 => (
                "Noted two viable approaches and one open risk",
                json!({"approaches": 2, "risks": 1}),
            ),
            6 => (
                "Research phase complete; approach selected",
                json!({"checkpoint": {"summary": "Research complete, approach selected"}}),
            ),
            7 => (
                "Started the build with the selected approach",
                json!({"tool": "build", "args": {"target": "default"}}),
            ),
            8 => (
                "Build produced a partial result",
                json!({"tool": "build", "status": "partial"}),
            ),
            9 => (
                "Integration step failed on a missing dependency",
                json!({"error": "missing dependency"}),
            ),
            10 => (
                "Retrying with the dependency pinned",
                json!({"attempt": 2}),
            ),
            11 => (
                "Build succeeded on retry",
                json!({"tool": "build", "status": "ok"}),
            ),
            12 => (
                "Reviewed the build output; minor issues only",
                json!({"issues": 2, "severity": "minor"}),
            ),
            13 => (
                "Execution reviewed and accepted with minor follow-ups",
                json!({"checkpoint": {"summary": "Execution accepted, minor follow-ups open"}}),
            ),
            14 => (
                "Assigned follow-up fixes to the executor",
                json!({"assignee": "executor", "task": "follow-up fixes"}),
            ),
            15 => (
                "Applied the follow-up fixes",
                json!({"tool": "patch", "args": {"files": 2}}),
            ),
            16 => (
                "Confirmed follow-ups resolved",
                json!({"issues": 0}),
            ),
            17 => (
                "Mission complete",
                json!({"outcome": "success"}),
            ),
            _ => return None,
        };

        Some(DefaultContent {
            summary: summary.to_string(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::StepSchedule;

    #[test]
    fn test_standard_content_covers_every_step() {
        let provider = StandardDefaultContent;
        for (step, _) in StepSchedule::standard().iter() {
            let content = provider.content_for(step).expect("content for scheduled step");
            assert!(!content.summary.is_empty());
            assert!(content.summary.chars().count() <= MAX_SUMMARY_CHARS);
            assert!(content.payload.is_object());
        }
        assert!(provider.content_for(18).is_none());
    }

    #[test]
    fn test_generated_content_defaults_payload() {
        let content: GeneratedContent =
            serde_json::from_str(r#"{"summary": "Short note"}"#).unwrap();
        assert_eq!(content.payload, json!({}));
        assert!(content.checkpoint.is_none());
    }
}
