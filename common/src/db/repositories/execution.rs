// Postgres-backed execution history

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::history::ExecutionHistory;
use crate::models::{JobExecution, JobParameters, StepExecution};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

pub struct PgExecutionHistory {
    pool: DbPool,
}

impl PgExecutionHistory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Most recent executions of a job, newest first
    #[instrument(skip(self))]
    pub async fn find_by_job(&self, job_name: &str, limit: i64) -> Result<Vec<JobExecution>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_name, parameters, status, current_step,
                   step_executions, failure, started_at, ended_at
            FROM job_executions
            WHERE job_name = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(job_name)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter().map(execution_from_row).collect()
    }
}

fn execution_from_row(row: &PgRow) -> Result<JobExecution, DatabaseError> {
    let status: String = row.try_get("status")?;
    let Json(parameters): Json<JobParameters> = row.try_get("parameters")?;
    let Json(step_executions): Json<Vec<StepExecution>> = row.try_get("step_executions")?;

    Ok(JobExecution {
        id: row.try_get("id")?,
        job_name: row.try_get("job_name")?,
        parameters,
        status: status.parse().map_err(DatabaseError::QueryFailed)?,
        current_step: row.try_get("current_step")?,
        step_executions,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        failure: row.try_get("failure")?,
    })
}

#[async_trait]
impl ExecutionHistory for PgExecutionHistory {
    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    async fn create(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO job_executions (
                id, job_name, parameters, status, current_step,
                step_executions, failure, started_at, ended_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id)
        .bind(&execution.job_name)
        .bind(Json(&execution.parameters))
        .bind(execution.status.to_string())
        .bind(&execution.current_step)
        .bind(Json(&execution.step_executions))
        .bind(&execution.failure)
        .bind(execution.started_at)
        .bind(execution.ended_at)
        .execute(self.pool.pool())
        .await?;

        tracing::debug!(job_name = %execution.job_name, "Execution created");
        Ok(())
    }

    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    async fn update(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE job_executions
            SET status = $2,
                current_step = $3,
                step_executions = $4,
                failure = $5,
                ended_at = $6
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(&execution.current_step)
        .bind(Json(&execution.step_executions))
        .bind(&execution.failure)
        .bind(execution.ended_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Execution not found: {}",
                execution.id
            )));
        }

        tracing::debug!(status = %execution.status, "Execution updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT id, job_name, parameters, status, current_step,
                   step_executions, failure, started_at, ended_at
            FROM job_executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(execution_from_row).transpose()
    }
}
