// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the mission aggregate and its event log,
//! following the DDD Repository pattern: interfaces defined in the domain
//! layer, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Responsibility | Implementations |
//! |-------|----------------|-----------------|
//! | `MissionRepository` | mission records and cached projection | `InMemoryMissionStore`, `PostgresMissionStore` |
//! | `EventRepository` | append-only step log | `InMemoryMissionStore`, `PostgresMissionStore` |
//!
//! Both are implemented by a single store so a mission and its seed events
//! can be written together. `MissionStore` names that combination.
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from `missionlog-config.yaml`
//! (`spec.store.backend`). In-memory is used for development and tests;
//! PostgreSQL for anything that must survive a restart.

use async_trait::async_trait;

use crate::domain::mission::{Mission, MissionId};
use crate::domain::step_event::{AppendOutcome, NewStepEvent, StepEvent};

/// Hard cap on events returned by one `list` call.
pub const MAX_EVENTS_PER_PAGE: usize = 200;

/// Upper bound for `find_recent`.
pub const MAX_RECENT_MISSIONS: usize = 50;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Window over one mission's log. Steps are inclusive on `max_step` and
/// exclusive on `after_step`; results are ascending by step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    pub max_step: Option<u32>,
    pub after_step: Option<u32>,
    pub limit: usize,
}

impl EventQuery {
    pub fn first_page() -> Self {
        Self {
            max_step: None,
            after_step: None,
            limit: MAX_EVENTS_PER_PAGE,
        }
    }

    pub fn up_to(max_step: u32) -> Self {
        Self {
            max_step: Some(max_step),
            ..Self::first_page()
        }
    }

    pub fn after(mut self, step: u32) -> Self {
        self.after_step = Some(step);
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_EVENTS_PER_PAGE)
    }

    pub fn matches(&self, step: u32) -> bool {
        self.max_step.is_none_or(|max| step <= max)
            && self.after_step.is_none_or(|after| step > after)
    }
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::first_page()
    }
}

/// Repository interface for Mission aggregates
#[async_trait]
pub trait MissionRepository: Send + Sync {
    /// Create a mission and its initial events in one write. Fails if the
    /// mission already exists.
    async fn create(&self, mission: &Mission, seed_events: &[NewStepEvent]) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MissionId) -> Result<Option<Mission>, RepositoryError>;

    /// Persist the projected fields of `mission` with a monotone merge against
    /// the stored row. Returns the stored result. `NotFound` if absent.
    async fn save_projection(&self, mission: &Mission) -> Result<Mission, RepositoryError>;

    /// Newest first, at most `limit` (capped at `MAX_RECENT_MISSIONS`).
    async fn find_recent(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError>;
}

/// Repository interface for the append-only step log
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Idempotent append keyed on `(mission_id, step)`. A concurrent or
    /// repeated append for the same key returns `AlreadyExists` with the
    /// stored event.
    async fn append(&self, event: NewStepEvent) -> Result<AppendOutcome, RepositoryError>;

    async fn list(&self, mission_id: MissionId, query: EventQuery) -> Result<Vec<StepEvent>, RepositoryError>;

    async fn find(&self, mission_id: MissionId, step: u32) -> Result<Option<StepEvent>, RepositoryError>;
}

pub trait MissionStore: MissionRepository + EventRepository {}

impl<T: MissionRepository + EventRepository> MissionStore for T {}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_window() {
        let query = EventQuery::up_to(13).after(5);
        assert!(!query.matches(5));
        assert!(query.matches(6));
        assert!(query.matches(13));
        assert!(!query.matches(14));
    }

    #[test]
    fn test_limit_is_capped() {
        let query = EventQuery {
            limit: 10_000,
            ..EventQuery::default()
        };
        assert_eq!(query.effective_limit(), MAX_EVENTS_PER_PAGE);
        let zero = EventQuery {
            limit: 0,
            ..EventQuery::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }
}
