//! # PostgreSQL Launch Repository
//!
//! Stores ledger rows in `tasker_dynamic_sub_workflow_launches` (see
//! `migrations/`). Status transitions are guarded in SQL with
//! `UPDATE ... WHERE status = $expected`, which gives per-row atomic
//! compare-and-set under read-committed isolation.

use super::repository::{LaunchRepository, LaunchUpdate, RepositoryResult};
use crate::error::RepositoryError;
use crate::models::{
    LaunchStatus, ResolvedDefinition, SubWorkflowLaunch, TaskInstanceId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT parent_task_instance_id, launch_index, definition_code, definition_version,
           parameters, command_id, sub_workflow_instance_id, status, last_observed_at
    FROM tasker_dynamic_sub_workflow_launches
"#;

/// Raw column values of a ledger row
#[derive(Debug, Clone, FromRow)]
pub struct LaunchRecord {
    pub parent_task_instance_id: i64,
    pub launch_index: i64,
    pub definition_code: i64,
    pub definition_version: i32,
    pub parameters: serde_json::Value,
    pub command_id: Option<Uuid>,
    pub sub_workflow_instance_id: Option<i64>,
    pub status: String,
    pub last_observed_at: DateTime<Utc>,
}

impl TryFrom<LaunchRecord> for SubWorkflowLaunch {
    type Error = RepositoryError;

    fn try_from(record: LaunchRecord) -> Result<Self, Self::Error> {
        let index = u32::try_from(record.launch_index).map_err(|_| RepositoryError::CorruptRow {
            parent_task_instance_id: record.parent_task_instance_id,
            index: 0,
            reason: format!("launch_index {} out of range", record.launch_index),
        })?;
        let corrupt = |reason: String| RepositoryError::CorruptRow {
            parent_task_instance_id: record.parent_task_instance_id,
            index,
            reason,
        };

        let status: LaunchStatus = record.status.parse().map_err(corrupt)?;
        let parameters: BTreeMap<String, String> =
            serde_json::from_value(record.parameters.clone())
                .map_err(|e| corrupt(format!("invalid parameters: {e}")))?;

        if status == LaunchStatus::Planned && record.sub_workflow_instance_id.is_some() {
            return Err(corrupt("planned row carries a sub-workflow instance".to_string()));
        }

        Ok(SubWorkflowLaunch {
            parent_task_instance_id: record.parent_task_instance_id,
            index,
            definition: ResolvedDefinition {
                definition_code: record.definition_code,
                version: record.definition_version,
            },
            parameters,
            command_id: record.command_id,
            sub_workflow_instance_id: record.sub_workflow_instance_id,
            status,
            last_observed_at: record.last_observed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgLaunchRepository {
    pool: PgPool,
}

impl PgLaunchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LaunchRepository for PgLaunchRepository {
    async fn insert_missing(&self, launches: &[SubWorkflowLaunch]) -> RepositoryResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for launch in launches {
            let parameters = serde_json::to_value(&launch.parameters).map_err(|e| {
                RepositoryError::CorruptRow {
                    parent_task_instance_id: launch.parent_task_instance_id,
                    index: launch.index,
                    reason: format!("unserializable parameters: {e}"),
                }
            })?;

            let result = sqlx::query(
                r#"
                INSERT INTO tasker_dynamic_sub_workflow_launches
                (parent_task_instance_id, launch_index, definition_code, definition_version,
                 parameters, status, last_observed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (parent_task_instance_id, launch_index) DO NOTHING
                "#,
            )
            .bind(launch.parent_task_instance_id)
            .bind(i64::from(launch.index))
            .bind(launch.definition.definition_code)
            .bind(launch.definition.version)
            .bind(parameters)
            .bind(launch.status.as_str())
            .bind(launch.last_observed_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn find(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
    ) -> RepositoryResult<Option<SubWorkflowLaunch>> {
        let query = format!(
            "{SELECT_COLUMNS} WHERE parent_task_instance_id = $1 AND launch_index = $2"
        );
        let record = sqlx::query_as::<_, LaunchRecord>(&query)
            .bind(parent_task_instance_id)
            .bind(i64::from(index))
            .fetch_optional(&self.pool)
            .await?;

        record.map(SubWorkflowLaunch::try_from).transpose()
    }

    async fn list(
        &self,
        parent_task_instance_id: TaskInstanceId,
    ) -> RepositoryResult<Vec<SubWorkflowLaunch>> {
        let query = format!(
            "{SELECT_COLUMNS} WHERE parent_task_instance_id = $1 ORDER BY launch_index ASC"
        );
        let records = sqlx::query_as::<_, LaunchRecord>(&query)
            .bind(parent_task_instance_id)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(SubWorkflowLaunch::try_from).collect()
    }

    async fn compare_and_set(
        &self,
        parent_task_instance_id: TaskInstanceId,
        index: u32,
        expected: LaunchStatus,
        update: &LaunchUpdate,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasker_dynamic_sub_workflow_launches
            SET status = $4,
                command_id = COALESCE($5, command_id),
                sub_workflow_instance_id = COALESCE($6, sub_workflow_instance_id),
                last_observed_at = $7
            WHERE parent_task_instance_id = $1
              AND launch_index = $2
              AND status = $3
            "#,
        )
        .bind(parent_task_instance_id)
        .bind(i64::from(index))
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.command_id)
        .bind(update.sub_workflow_instance_id)
        .bind(update.observed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
