// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Vendor-neutral text completion interface behind the LLM-backed content
//! generator. Concrete providers live in `infrastructure/llm/`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer over external LLM APIs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LLMError>;

    /// Provider name for logs and metrics (e.g. "ollama", "openai").
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,

    /// 0.0 = deterministic
    pub temperature: Option<f32>,

    /// Ask the provider to constrain output to a JSON object when it supports it.
    #[serde(default)]
    pub json_output: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(512),
            temperature: Some(0.4),
            json_output: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),
}
