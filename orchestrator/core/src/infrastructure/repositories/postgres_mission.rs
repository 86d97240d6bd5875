// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Mission
//!
//! PostgreSQL implementation of the mission and event repositories.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** `missions` / `mission_events` persistence
//!
//! Append uniqueness is delegated to the `(mission_id, step)` unique
//! constraint: `ON CONFLICT DO NOTHING` plus `rows_affected()` separates the
//! winner from everyone else without any application-level locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::mission::{
    Mission, MissionArtifacts, MissionId, MissionLineage, MissionStatus, RunMode,
};
use crate::domain::repository::{
    EventQuery, EventRepository, MissionRepository, RepositoryError, MAX_RECENT_MISSIONS,
};
use crate::domain::step_event::{
    AppendOutcome, EventId, NewStepEvent, StepEvent, UnknownVariant,
};

const MISSION_COLUMNS: &str = "id, title, status, current_step, created_at, updated_at, \
     last_checkpoint_at, latest_summary, checkpoint_step, parent_mission_id, \
     branch_from_step, run_mode";

const EVENT_COLUMNS: &str = "id, mission_id, step, ts, agent, kind, summary, payload, provenance";

const FOREIGN_KEY_VIOLATION: &str = "23503";

pub struct PostgresMissionStore {
    pool: PgPool,
}

impl PostgresMissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn step_to_sql(step: u32) -> Result<i32, RepositoryError> {
    i32::try_from(step).map_err(|_| RepositoryError::Serialization(format!("step {} out of range", step)))
}

/// Query bound for a step; anything past the column range clamps to its top.
fn step_bound_to_sql(step: u32) -> i32 {
    i32::try_from(step).unwrap_or(i32::MAX)
}

fn step_from_sql(value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Serialization(format!("negative step {}", value)))
}

fn parse_variant<T>(value: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|e: UnknownVariant| RepositoryError::Serialization(e.to_string()))
}

fn parse_mission_row(row: PgRow) -> Result<Mission, RepositoryError> {
    let status: String = row.try_get("status")?;
    let run_mode: String = row.try_get("run_mode")?;
    let checkpoint_step: Option<i32> = row.try_get("checkpoint_step")?;
    let parent: Option<Uuid> = row.try_get("parent_mission_id")?;
    let branch_from_step: Option<i32> = row.try_get("branch_from_step")?;

    let lineage = match (parent, branch_from_step) {
        (Some(parent), Some(step)) => Some(MissionLineage {
            parent_mission_id: MissionId(parent),
            branch_from_step: step_from_sql(step)?,
        }),
        _ => None,
    };

    Ok(Mission {
        id: MissionId(row.try_get("id")?),
        title: row.try_get("title")?,
        status: status.parse::<MissionStatus>().map_err(RepositoryError::Serialization)?,
        current_step: step_from_sql(row.try_get("current_step")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_checkpoint_at: row.try_get("last_checkpoint_at")?,
        artifacts: MissionArtifacts {
            latest_summary: row.try_get("latest_summary")?,
            checkpoint_step: checkpoint_step.map(step_from_sql).transpose()?,
        },
        lineage,
        run_mode: run_mode.parse::<RunMode>().map_err(RepositoryError::Serialization)?,
    })
}

fn parse_event_row(row: PgRow) -> Result<StepEvent, RepositoryError> {
    let agent: String = row.try_get("agent")?;
    let kind: String = row.try_get("kind")?;
    let provenance: String = row.try_get("provenance")?;
    let ts: DateTime<Utc> = row.try_get("ts")?;

    Ok(StepEvent {
        id: EventId(row.try_get("id")?),
        mission_id: MissionId(row.try_get("mission_id")?),
        ts,
        step: step_from_sql(row.try_get("step")?)?,
        agent: parse_variant(&agent)?,
        kind: parse_variant(&kind)?,
        summary: row.try_get("summary")?,
        payload: row.try_get("payload")?,
        provenance: parse_variant(&provenance)?,
    })
}

fn map_append_error(err: sqlx::Error, mission_id: MissionId) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            return RepositoryError::NotFound(format!("mission {}", mission_id));
        }
    }
    RepositoryError::Database(format!("Failed to append mission event: {}", err))
}

async fn insert_event<'e, E>(executor: E, event: &StepEvent, step: i32) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO mission_events (id, mission_id, step, ts, agent, kind, summary, payload, provenance)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (mission_id, step) DO NOTHING
        "#,
    )
    .bind(event.id.0)
    .bind(event.mission_id.0)
    .bind(step)
    .bind(event.ts)
    .bind(event.agent.as_str())
    .bind(event.kind.as_str())
    .bind(&event.summary)
    .bind(&event.payload)
    .bind(event.provenance.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl MissionRepository for PostgresMissionStore {
    async fn create(&self, mission: &Mission, seed_events: &[NewStepEvent]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO missions (
                id, title, status, current_step, created_at, updated_at,
                last_checkpoint_at, latest_summary, checkpoint_step,
                parent_mission_id, branch_from_step, run_mode
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(mission.id.0)
        .bind(&mission.title)
        .bind(mission.status.as_str())
        .bind(step_to_sql(mission.current_step)?)
        .bind(mission.created_at)
        .bind(mission.updated_at)
        .bind(mission.last_checkpoint_at)
        .bind(&mission.artifacts.latest_summary)
        .bind(mission.artifacts.checkpoint_step.map(step_to_sql).transpose()?)
        .bind(mission.lineage.map(|l| l.parent_mission_id.0))
        .bind(mission.lineage.map(|l| step_to_sql(l.branch_from_step)).transpose()?)
        .bind(mission.run_mode.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to create mission: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists(format!("mission {}", mission.id)));
        }

        for seed in seed_events {
            let step = step_to_sql(seed.step)?;
            let mut event = StepEvent::from_new(seed.clone());
            event.mission_id = mission.id;
            insert_event(&mut *tx, &event, step)
                .await
                .map_err(|e| RepositoryError::Database(format!("Failed to copy seed event: {}", e)))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: MissionId) -> Result<Option<Mission>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM missions WHERE id = $1", MISSION_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(parse_mission_row).transpose()
    }

    async fn save_projection(&self, mission: &Mission) -> Result<Mission, RepositoryError> {
        // Expressions on the right read the pre-update row.
        let row = sqlx::query(&format!(
            r#"
            UPDATE missions SET
                current_step = GREATEST(current_step, $2),
                status = CASE WHEN status = 'done' THEN status ELSE $3 END,
                last_checkpoint_at = CASE
                    WHEN COALESCE($4, 0) >= COALESCE(checkpoint_step, 0) THEN $5
                    ELSE last_checkpoint_at END,
                latest_summary = CASE
                    WHEN COALESCE($4, 0) >= COALESCE(checkpoint_step, 0) THEN $6
                    ELSE latest_summary END,
                checkpoint_step = CASE
                    WHEN COALESCE($4, 0) >= COALESCE(checkpoint_step, 0) THEN $4
                    ELSE checkpoint_step END,
                updated_at = GREATEST(updated_at, $7)
            WHERE id = $1
            RETURNING {}
            "#,
            MISSION_COLUMNS
        ))
        .bind(mission.id.0)
        .bind(step_to_sql(mission.current_step)?)
        .bind(mission.status.as_str())
        .bind(mission.artifacts.checkpoint_step.map(step_to_sql).transpose()?)
        .bind(mission.last_checkpoint_at)
        .bind(&mission.artifacts.latest_summary)
        .bind(mission.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save mission projection: {}", e)))?;

        match row {
            Some(row) => parse_mission_row(row),
            None => Err(RepositoryError::NotFound(format!("mission {}", mission.id))),
        }
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        let limit = limit.min(MAX_RECENT_MISSIONS) as i64;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM missions ORDER BY created_at DESC LIMIT $1",
            MISSION_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_mission_row).collect()
    }
}

#[async_trait]
impl EventRepository for PostgresMissionStore {
    async fn append(&self, event: NewStepEvent) -> Result<AppendOutcome, RepositoryError> {
        let sql_step = step_to_sql(event.step)?;
        let mission_id = event.mission_id;
        let step = event.step;
        let candidate = StepEvent::from_new(event);

        let inserted = insert_event(&self.pool, &candidate, sql_step)
            .await
            .map_err(|e| map_append_error(e, mission_id))?;

        if inserted == 1 {
            return Ok(AppendOutcome::Inserted(candidate));
        }

        match self.find(mission_id, step).await? {
            Some(existing) => Ok(AppendOutcome::AlreadyExists(existing)),
            None => Err(RepositoryError::Database(format!(
                "append conflict on mission {} step {} but no stored event found",
                mission_id, step
            ))),
        }
    }

    async fn list(&self, mission_id: MissionId, query: EventQuery) -> Result<Vec<StepEvent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM mission_events
            WHERE mission_id = $1
              AND ($2::INTEGER IS NULL OR step <= $2)
              AND ($3::INTEGER IS NULL OR step > $3)
            ORDER BY step ASC
            LIMIT $4
            "#,
            EVENT_COLUMNS
        ))
        .bind(mission_id.0)
        .bind(query.max_step.map(step_bound_to_sql))
        .bind(query.after_step.map(step_bound_to_sql))
        .bind(query.effective_limit() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_event_row).collect()
    }

    async fn find(&self, mission_id: MissionId, step: u32) -> Result<Option<StepEvent>, RepositoryError> {
        let Ok(step) = i32::try_from(step) else {
            return Ok(None);
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM mission_events WHERE mission_id = $1 AND step = $2",
            EVENT_COLUMNS
        ))
        .bind(mission_id.0)
        .bind(step)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_event_row).transpose()
    }
}
