// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Builds concrete stores and collaborators from `MissionlogConfig` and wires
//! them into a [`MissionRuntime`]. The domain layer only sees the traits.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Composition root for the store, engines and collaborators

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::ledger::MissionLedger;
use crate::application::mission_service::{MissionService, StandardMissionService};
use crate::application::scripted_driver::ScriptedDriver;
use crate::application::tick_engine::{TickEngine, TickSettings};
use crate::domain::config::{
    resolve_env_reference, MissionlogConfig, RankerConfig, RankerStrategy, StoreBackendKind,
    StoreConfig,
};
use crate::domain::content::{ContentGenerator, DefaultContentProvider, StandardDefaultContent};
use crate::domain::llm::CompletionOptions;
use crate::domain::ranking::ContextRanker;
use crate::domain::repository::{MissionStore, PostgresConfig, StorageBackend};
use crate::domain::schedule::StepSchedule;
use crate::infrastructure::content_generator::LlmContentGenerator;
use crate::infrastructure::context_ranker::{HttpContextRanker, LexicalContextRanker};
use crate::infrastructure::db::Database;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::build_provider;
use crate::infrastructure::repositories::{InMemoryMissionStore, PostgresMissionStore};

/// Resolve the configured backend, including any "env:VAR" database URL.
pub fn storage_backend(config: &StoreConfig) -> anyhow::Result<StorageBackend> {
    match config.backend {
        StoreBackendKind::Memory => Ok(StorageBackend::InMemory),
        StoreBackendKind::Postgres => {
            let raw = config
                .database_url
                .as_deref()
                .context("spec.store.database_url is required for the postgres backend")?;
            Ok(StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: resolve_env_reference(raw)?,
            }))
        }
    }
}

/// Creates the mission store for the configured backend. The `Database`
/// handle is returned so the caller can close it on shutdown.
pub async fn create_mission_store(
    config: &StoreConfig,
) -> anyhow::Result<(Arc<dyn MissionStore>, Option<Database>)> {
    match storage_backend(config)? {
        StorageBackend::InMemory => {
            warn!("Using the in-memory mission store; missions are lost on restart");
            Ok((Arc::new(InMemoryMissionStore::new()), None))
        }
        StorageBackend::PostgreSQL(pg) => {
            let db = Database::new(&pg.connection_string, config.max_connections).await?;
            db.migrate().await?;
            info!("Connected to PostgreSQL mission store");
            let store = PostgresMissionStore::new(db.get_pool().clone());
            Ok((Arc::new(store), Some(db)))
        }
    }
}

pub fn create_content_generator(
    config: &MissionlogConfig,
    schedule: &StepSchedule,
) -> anyhow::Result<Option<Arc<dyn ContentGenerator>>> {
    let generator = &config.spec.generator;
    let Some(provider) = build_provider(generator)? else {
        return Ok(None);
    };

    let options = CompletionOptions {
        max_tokens: Some(generator.max_tokens),
        temperature: Some(generator.temperature),
        json_output: true,
    };
    Ok(Some(Arc::new(LlmContentGenerator::new(
        provider,
        options,
        schedule.total_steps(),
    ))))
}

pub fn create_context_ranker(config: &RankerConfig) -> anyhow::Result<Option<Arc<dyn ContextRanker>>> {
    match config.strategy {
        RankerStrategy::None => Ok(None),
        RankerStrategy::Lexical => Ok(Some(Arc::new(LexicalContextRanker))),
        RankerStrategy::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .context("spec.ranker.endpoint is required for the http strategy")?;
            let ranker = HttpContextRanker::new(endpoint, config.timeout())?;
            Ok(Some(Arc::new(ranker)))
        }
    }
}

/// Everything `serve` needs, built once at startup.
pub struct MissionRuntime {
    pub mission_service: Arc<dyn MissionService>,
    pub scripted_driver: Arc<ScriptedDriver>,
    pub event_bus: EventBus,
    pub database: Option<Database>,
}

impl MissionRuntime {
    pub async fn shutdown(&self) {
        self.scripted_driver.stop_all();
        if let Some(db) = &self.database {
            db.close().await;
        }
    }
}

pub async fn build_mission_runtime(config: &MissionlogConfig) -> anyhow::Result<MissionRuntime> {
    let (store, database) = create_mission_store(&config.spec.store).await?;
    build_runtime_with_store(config, store, database)
}

/// Wire a runtime over an existing store.
pub fn build_runtime_with_store(
    config: &MissionlogConfig,
    store: Arc<dyn MissionStore>,
    database: Option<Database>,
) -> anyhow::Result<MissionRuntime> {
    let schedule = Arc::new(StepSchedule::standard());
    let event_bus = EventBus::with_default_capacity();
    let defaults: Arc<dyn DefaultContentProvider> = Arc::new(StandardDefaultContent);

    let ledger = Arc::new(MissionLedger::new(
        store,
        schedule.clone(),
        event_bus.clone(),
        config.spec.store.operation_timeout(),
    ));

    let engine = &config.spec.engine;
    let settings = TickSettings {
        context_window: engine.context_window,
        top_k: engine.top_k,
        generator_timeout: config.spec.generator.timeout(),
        ranker_timeout: config.spec.ranker.timeout(),
    };
    let tick_engine = Arc::new(TickEngine::new(
        ledger.clone(),
        create_content_generator(config, &schedule)?,
        create_context_ranker(&config.spec.ranker)?,
        defaults.clone(),
        settings,
    ));

    let mission_service: Arc<dyn MissionService> =
        Arc::new(StandardMissionService::new(ledger, tick_engine, defaults.clone()));
    let scripted_driver = Arc::new(ScriptedDriver::new(
        mission_service.clone(),
        schedule,
        defaults,
        engine.scripted_interval(),
    ));

    Ok(MissionRuntime {
        mission_service,
        scripted_driver,
        event_bus,
        database,
    })
}
