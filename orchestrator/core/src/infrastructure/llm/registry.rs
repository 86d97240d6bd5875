// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Construction
//
// Builds the single provider behind the content generator from the
// `spec.generator` section. API keys support the "env:VAR_NAME" syntax.

use crate::domain::config::{resolve_env_reference, GeneratorConfig, GeneratorProvider};
use crate::domain::llm::LLMProvider;
use std::sync::Arc;
use tracing::info;

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

/// `Ok(None)` when generation is disabled.
pub fn build_provider(config: &GeneratorConfig) -> anyhow::Result<Option<Arc<dyn LLMProvider>>> {
    if config.provider == GeneratorProvider::None {
        info!("Content generator disabled; ticks will use default content");
        return Ok(None);
    }

    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| anyhow::anyhow!("spec.generator.endpoint is not set"))?;
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("spec.generator.model is not set"))?;

    let provider: Arc<dyn LLMProvider> = match config.provider {
        GeneratorProvider::Ollama => Arc::new(OllamaAdapter::new(endpoint, model.clone())),
        GeneratorProvider::OpenAI => {
            let api_key = config
                .api_key
                .as_deref()
                .map(resolve_env_reference)
                .transpose()?;
            Arc::new(OpenAIAdapter::new(endpoint, api_key, model.clone()))
        }
        GeneratorProvider::None => return Ok(None),
    };

    info!(provider = provider.name(), model = %model, "Initialized content generator provider");
    Ok(Some(provider))
}
