//! At-least-once message queues
//!
//! The dispatcher fans jobs out through one queue and workers report
//! completions through another. Consumers must `ack` a delivery once it is
//! handled or `release` it for redelivery; a delivery released too many
//! times is dead-lettered instead.

use async_trait::async_trait;
use geocore_common::Result;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryJobQueue;
pub use postgres::PgJobQueue;

/// Queue carrying one message per discovered page.
pub const JOBS_QUEUE: &str = "jobs";

/// Queue carrying worker completion signals.
pub const COMPLETIONS_QUEUE: &str = "completions";

/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Requeued,
    DeadLettered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub in_flight: usize,
    pub dead: usize,
}

impl QueueStats {
    /// Nothing waiting and nothing being worked on
    pub fn is_drained(&self) -> bool {
        self.ready == 0 && self.in_flight == 0
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<()>;

    /// Take up to `max` visible messages; empty when none are ready
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Remove a handled delivery for good
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Give a delivery back for redelivery, or dead-letter it once it has
    /// used up its attempts
    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<ReleaseOutcome>;

    async fn stats(&self) -> Result<QueueStats>;
}
