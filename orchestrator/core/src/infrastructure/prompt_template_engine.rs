// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders the step-generation prompt sent to the LLM provider, using
//! Handlebars for placeholder substitution.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn a `GenerationRequest` into provider input
//!
//! # Supported Placeholders
//!
//! - `{{mission_title}}` - Mission title
//! - `{{step}}` / `{{total_steps}}` - Position in the schedule
//! - `{{agent}}` / `{{kind}}` - Scheduled actor and event kind
//! - `{{#each context}}` - Ranked prior summaries, best first
//! - `{{#if checkpoint}}` - Set when the step is a checkpoint

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;

use crate::domain::content::{GenerationRequest, MAX_SUMMARY_CHARS};
use crate::domain::step_event::EventKind;

#[derive(Debug, Clone, Serialize)]
pub struct StepPromptContext {
    pub mission_title: String,
    pub step: u32,
    pub total_steps: u32,
    pub agent: String,
    pub kind: String,
    pub context: Vec<String>,
    pub checkpoint: bool,
    pub max_summary_chars: usize,
}

impl StepPromptContext {
    pub fn from_request(request: &GenerationRequest, total_steps: u32) -> Self {
        Self {
            mission_title: request.mission_title.clone(),
            step: request.step,
            total_steps,
            agent: request.agent.to_string(),
            kind: request.kind.to_string(),
            context: request.ranked_context.clone(),
            checkpoint: request.kind == EventKind::Checkpoint,
            max_summary_chars: MAX_SUMMARY_CHARS,
        }
    }
}

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
    template: String,
}

impl PromptTemplateEngine {
    pub fn new() -> Self {
        Self::with_template(Self::default_template())
    }

    pub fn with_template(template: impl Into<String>) -> Self {
        let mut handlebars = Handlebars::new();
        // Missing variables render empty
        handlebars.set_strict_mode(false);
        // Prompts are plain text
        handlebars.register_escape_fn(handlebars::no_escape);

        Self {
            handlebars,
            template: template.into(),
        }
    }

    pub fn render(&self, context: &StepPromptContext) -> Result<String> {
        self.handlebars
            .render_template(&self.template, context)
            .context("Failed to render step prompt template")
    }

    pub fn default_template() -> &'static str {
        "You are the {{agent}} on the mission \"{{mission_title}}\".\n\
         Write step {{step}} of {{total_steps}}; the event kind is {{kind}}.\n\
         {{#if context}}\nRelevant earlier steps:\n{{#each context}}- {{this}}\n{{/each}}{{/if}}\n\
         Reply with one JSON object: {\"summary\": string of at most {{max_summary_chars}} characters, \
         \"payload\": object with structured details\
         {{#if checkpoint}}, \"checkpoint\": {\"summary\": one-sentence state of the mission}{{/if}}}.\n\
         Reply with JSON only."
    }

    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
