// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content Generator
//!
//! LLM-backed implementation of the `ContentGenerator` collaborator.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Prompt rendering → provider completion → validated
//!   `GeneratedContent`
//!
//! The model is asked for a single JSON object. Output that cannot be read as
//! one (no object, blank summary, non-object payload) is reported as
//! `GeneratorError::Malformed` so the tick engine falls back to default
//! content. Over-long summaries are truncated rather than rejected.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::domain::content::{
    truncate_summary, CheckpointArtifact, ContentGenerator, GeneratedContent, GenerationRequest,
    GeneratorError,
};
use crate::domain::llm::{CompletionOptions, LLMError, LLMProvider};
use crate::infrastructure::prompt_template_engine::{PromptTemplateEngine, StepPromptContext};

pub struct LlmContentGenerator {
    provider: Arc<dyn LLMProvider>,
    templates: PromptTemplateEngine,
    options: CompletionOptions,
    total_steps: u32,
}

impl LlmContentGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, options: CompletionOptions, total_steps: u32) -> Self {
        Self {
            provider,
            templates: PromptTemplateEngine::new(),
            options,
            total_steps,
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GeneratorError> {
        let context = StepPromptContext::from_request(request, self.total_steps);
        let prompt = self
            .templates
            .render(&context)
            .map_err(|e| GeneratorError::Unavailable(e.to_string()))?;

        let completion = self
            .provider
            .complete(&prompt, &self.options)
            .await
            .map_err(|e| match e {
                LLMError::Network(msg) => GeneratorError::Unavailable(format!("network: {}", msg)),
                other => GeneratorError::Unavailable(other.to_string()),
            })?;

        debug!(
            provider = self.provider.name(),
            model = %completion.model,
            tokens = completion.total_tokens,
            step = request.step,
            "Received generator completion"
        );

        parse_generated(&completion.text)
    }
}

#[derive(Deserialize)]
struct RawGenerated {
    summary: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    checkpoint: Option<RawCheckpoint>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCheckpoint {
    Object { summary: String },
    Text(String),
}

/// Extract and validate the JSON object in a model reply.
pub fn parse_generated(text: &str) -> Result<GeneratedContent, GeneratorError> {
    let json = extract_json_object(text)
        .ok_or_else(|| GeneratorError::Malformed("no JSON object in output".to_string()))?;

    let raw: RawGenerated =
        serde_json::from_str(json).map_err(|e| GeneratorError::Malformed(e.to_string()))?;

    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GeneratorError::Malformed("missing summary".to_string()))?;

    let payload = match raw.payload {
        None | Some(serde_json::Value::Null) => serde_json::json!({}),
        Some(value @ serde_json::Value::Object(_)) => value,
        Some(_) => return Err(GeneratorError::Malformed("payload is not an object".to_string())),
    };

    let checkpoint = raw
        .checkpoint
        .map(|c| match c {
            RawCheckpoint::Object { summary } | RawCheckpoint::Text(summary) => summary,
        })
        .map(|s| truncate_summary(&s))
        .filter(|s| !s.is_empty())
        .map(|summary| CheckpointArtifact { summary });

    Ok(GeneratedContent {
        summary: truncate_summary(&summary),
        payload,
        checkpoint,
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
