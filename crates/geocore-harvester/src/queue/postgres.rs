//! Postgres-backed queue
//!
//! Consumers claim rows with `FOR UPDATE SKIP LOCKED`, so any number of
//! worker processes can poll the same queue. A claimed row stays invisible
//! for the visibility timeout; a consumer that dies without acking gets its
//! message redelivered after that.

use async_trait::async_trait;
use geocore_common::{HarvestError, Result};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{instrument, warn};

use super::{Delivery, JobQueue, QueueStats, ReleaseOutcome, DEFAULT_MAX_ATTEMPTS};

/// Default time a claimed message stays hidden from other consumers.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(300);

fn queue_err(context: &str) -> impl FnOnce(sqlx::Error) -> HarvestError + '_ {
    move |e| HarvestError::Queue(format!("{}: {}", context, e))
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    name: String,
    max_attempts: u32,
    visibility_timeout: Duration,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        sqlx::query("INSERT INTO scatter_gather_queue (queue_name, payload) VALUES ($1, $2)")
            .bind(&self.name)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(queue_err("failed to enqueue message"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.name))]
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let rows: Vec<(i64, Vec<u8>, i32)> = sqlx::query_as(
            r#"
            UPDATE scatter_gather_queue
            SET status = 'in_flight',
                attempts = attempts + 1,
                visible_at = NOW() + make_interval(secs => $3)
            WHERE id IN (
                SELECT id
                FROM scatter_gather_queue
                WHERE queue_name = $1
                  AND status IN ('pending', 'in_flight')
                  AND visible_at <= NOW()
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, attempts
            "#,
        )
        .bind(&self.name)
        .bind(i64::try_from(max).unwrap_or(i64::MAX))
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err("failed to receive messages"))?;

        let mut deliveries: Vec<Delivery> = rows
            .into_iter()
            .map(|(id, payload, attempts)| Delivery {
                id,
                payload,
                attempt: u32::try_from(attempts).unwrap_or(0),
            })
            .collect();
        deliveries.sort_by_key(|d| d.id);
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM scatter_gather_queue WHERE id = $1")
            .bind(delivery.id)
            .execute(&self.pool)
            .await
            .map_err(queue_err("failed to ack message"))?;
        Ok(())
    }

    #[instrument(skip(self, delivery), fields(queue = %self.name, message_id = delivery.id))]
    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<ReleaseOutcome> {
        let status: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE scatter_gather_queue
            SET status = CASE WHEN attempts >= $2 THEN 'dead' ELSE 'pending' END,
                visible_at = NOW(),
                last_error = $3
            WHERE id = $1 AND status = 'in_flight'
            RETURNING status
            "#,
        )
        .bind(delivery.id)
        .bind(i32::try_from(self.max_attempts).unwrap_or(i32::MAX))
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_err("failed to release message"))?;

        match status {
            Some((status,)) if status == "dead" => {
                warn!(
                    action = "dead_letter",
                    attempts = delivery.attempt,
                    reason = %reason,
                    "Message exhausted its delivery attempts"
                );
                Ok(ReleaseOutcome::DeadLettered)
            },
            _ => Ok(ReleaseOutcome::Requeued),
        }
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM scatter_gather_queue
            WHERE queue_name = $1
            GROUP BY status
            "#,
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err("failed to read queue stats"))?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            match status.as_str() {
                "pending" => stats.ready = count,
                "in_flight" => stats.in_flight = count,
                "dead" => stats.dead = count,
                _ => {},
            }
        }
        Ok(stats)
    }
}
