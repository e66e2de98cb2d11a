//! Postgres-backed state store
//!
//! Counting a completion flags the job row and bumps the finished counter
//! in one transaction. The row update takes the row lock, so concurrent
//! aggregators count each job once, and the conditional counter update
//! keeps `finished` within the total.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::{BatchCounter, CompletionCount, JobState, JobStatus, StateStore};

type CounterRow = (String, i64, i64, bool);
type JobRow = (String, String, String, bool);

fn state_err(context: &str) -> impl FnOnce(sqlx::Error) -> HarvestError + '_ {
    move |e| HarvestError::State(format!("{}: {}", context, e))
}

fn to_job((scatter_gather_id, process_id, status, counted): JobRow) -> Result<JobState> {
    Ok(JobState {
        scatter_gather_id,
        process_id,
        status: status.parse()?,
        counted,
    })
}

fn to_counter((scatter_gather_id, total_processes, finished_processes, gathered): CounterRow) -> BatchCounter {
    BatchCounter {
        scatter_gather_id,
        total_processes,
        finished_processes,
        gathered,
    }
}

#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    #[instrument(skip(self))]
    async fn create_batch(&self, batch_id: &str, total: i64) -> Result<BatchCounter> {
        let row: Option<CounterRow> = sqlx::query_as(
            r#"
            INSERT INTO scatter_gather_aggregate (scatter_gather_id, total_processes, finished_processes)
            VALUES ($1, $2, 0)
            ON CONFLICT (scatter_gather_id) DO NOTHING
            RETURNING scatter_gather_id, total_processes, finished_processes, gathered_at IS NOT NULL
            "#,
        )
        .bind(batch_id)
        .bind(total)
        .fetch_optional(&self.pool)
        .await
        .map_err(state_err("failed to create batch"))?;

        row.map(to_counter)
            .ok_or_else(|| HarvestError::State(format!("batch {} already exists", batch_id)))
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<BatchCounter>> {
        let row: Option<CounterRow> = sqlx::query_as(
            r#"
            SELECT scatter_gather_id, total_processes, finished_processes, gathered_at IS NOT NULL
            FROM scatter_gather_aggregate
            WHERE scatter_gather_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(state_err("failed to read batch"))?;

        Ok(row.map(to_counter))
    }

    #[instrument(skip(self, process_ids), fields(signals = process_ids.len()))]
    async fn count_completions(&self, batch_id: &str, process_ids: &[String]) -> Result<CompletionCount> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(state_err("failed to begin transaction"))?;

        let counted: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE scatter_gather_processes
            SET counted = TRUE, updated_at = NOW()
            WHERE scatter_gather_id = $1
              AND process_id = ANY($2)
              AND status = 'finished'
              AND NOT counted
            RETURNING process_id
            "#,
        )
        .bind(batch_id)
        .bind(process_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(state_err("failed to flag counted jobs"))?;
        let counted: Vec<String> = counted.into_iter().map(|(id,)| id).collect();

        if counted.is_empty() {
            tx.rollback().await.map_err(state_err("failed to roll back"))?;
            return match self.get_batch(batch_id).await? {
                Some(counter) => Ok(CompletionCount { counter, counted }),
                None => Err(HarvestError::State(format!("batch {} not found", batch_id))),
            };
        }

        let delta = counted.len() as i64;
        let row: Option<CounterRow> = sqlx::query_as(
            r#"
            UPDATE scatter_gather_aggregate
            SET finished_processes = finished_processes + $2, updated_at = NOW()
            WHERE scatter_gather_id = $1
              AND finished_processes + $2 <= total_processes
            RETURNING scatter_gather_id, total_processes, finished_processes, gathered_at IS NOT NULL
            "#,
        )
        .bind(batch_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(state_err("failed to increment finished_processes"))?;

        let Some(row) = row else {
            tx.rollback().await.map_err(state_err("failed to roll back"))?;
            return match self.get_batch(batch_id).await? {
                Some(counter) => Err(HarvestError::CounterOverflow {
                    batch_id: batch_id.to_string(),
                    finished: counter.finished_processes,
                    delta,
                    total: counter.total_processes,
                }),
                None => Err(HarvestError::State(format!("batch {} not found", batch_id))),
            };
        };

        tx.commit().await.map_err(state_err("failed to commit counted jobs"))?;
        let counter = to_counter(row);
        debug!(
            added = delta,
            finished = counter.finished_processes,
            total = counter.total_processes,
            "Counter advanced"
        );
        Ok(CompletionCount { counter, counted })
    }

    async fn mark_gathered(&self, batch_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scatter_gather_aggregate
            SET gathered_at = NOW(), updated_at = NOW()
            WHERE scatter_gather_id = $1
              AND gathered_at IS NULL
              AND finished_processes = total_processes
            "#,
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await
        .map_err(state_err("failed to mark batch gathered"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn put_job_state(&self, state: &JobState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO scatter_gather_processes (scatter_gather_id, process_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (scatter_gather_id, process_id) DO NOTHING
            "#,
        )
        .bind(&state.scatter_gather_id)
        .bind(&state.process_id)
        .bind(state.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(state_err("failed to insert job state"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_job(
        &self,
        batch_id: &str,
        process_id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scatter_gather_processes
            SET status = $4, updated_at = NOW()
            WHERE scatter_gather_id = $1 AND process_id = $2 AND status = $3
            "#,
        )
        .bind(batch_id)
        .bind(process_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(state_err("failed to transition job state"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_job_state(&self, batch_id: &str, process_id: &str) -> Result<Option<JobState>> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            SELECT scatter_gather_id, process_id, status, counted
            FROM scatter_gather_processes
            WHERE scatter_gather_id = $1 AND process_id = $2
            "#,
        )
        .bind(batch_id)
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(state_err("failed to read job state"))?;

        row.map(to_job).transpose()
    }

    async fn list_job_states(&self, batch_id: &str) -> Result<Vec<JobState>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT scatter_gather_id, process_id, status, counted
            FROM scatter_gather_processes
            WHERE scatter_gather_id = $1
            ORDER BY process_id
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(state_err("failed to list job states"))?;

        rows.into_iter().map(to_job).collect()
    }
}
