// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;

use crate::domain::mission::MissionId;
use crate::domain::repository::RepositoryError;

/// Errors surfaced by mission operations.
///
/// Duplicate appends are not errors; they are reported as `AlreadyExists` /
/// `Duplicate` outcomes. Generator and ranker failures never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Mission not found: {0}")]
    NotFound(MissionId),

    #[error("Mission {mission_id} has no events at or before step {fork_step}")]
    NotForkable { mission_id: MissionId, fork_step: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Storage call timed out after {}ms", .0.as_millis())]
    StorageTimeout(Duration),
}

impl MissionError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MissionError::Storage(RepositoryError::Database(_)) | MissionError::StorageTimeout(_)
        )
    }
}
