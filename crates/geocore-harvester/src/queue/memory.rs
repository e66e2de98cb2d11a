use async_trait::async_trait;
use geocore_common::Result;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::warn;

use super::{Delivery, JobQueue, QueueStats, ReleaseOutcome, DEFAULT_MAX_ATTEMPTS};

struct Message {
    id: i64,
    payload: Vec<u8>,
    attempts: u32,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    ready: VecDeque<Message>,
    in_flight: HashMap<i64, Message>,
    dead: Vec<Message>,
}

/// FIFO queue living in process memory
pub struct InMemoryJobQueue {
    name: String,
    max_attempts: u32,
    inner: Mutex<Inner>,
}

impl InMemoryJobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_max_attempts(name, DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(name: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            max_attempts: max_attempts.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Payloads of dead-lettered messages, oldest first
    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .await
            .dead
            .iter()
            .map(|m| m.payload.clone())
            .collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.ready.push_back(Message {
            id,
            payload,
            attempts: 0,
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut inner = self.inner.lock().await;
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let Some(mut message) = inner.ready.pop_front() else {
                break;
            };
            message.attempts += 1;
            deliveries.push(Delivery {
                id: message.id,
                payload: message.payload.clone(),
                attempt: message.attempts,
            });
            inner.in_flight.insert(message.id, message);
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.inner.lock().await.in_flight.remove(&delivery.id);
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<ReleaseOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(message) = inner.in_flight.remove(&delivery.id) else {
            // already acked or released
            return Ok(ReleaseOutcome::Requeued);
        };

        if message.attempts >= self.max_attempts {
            warn!(
                action = "dead_letter",
                queue = %self.name,
                message_id = message.id,
                attempts = message.attempts,
                reason = %reason,
                "Message exhausted its delivery attempts"
            );
            inner.dead.push(message);
            Ok(ReleaseOutcome::DeadLettered)
        } else {
            inner.ready.push_back(message);
            Ok(ReleaseOutcome::Requeued)
        }
    }

    async fn stats(&self) -> Result<QueueStats> {
        let inner = self.inner.lock().await;
        Ok(QueueStats {
            ready: inner.ready.len(),
            in_flight: inner.in_flight.len(),
            dead: inner.dead.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_and_ack() {
        let queue = InMemoryJobQueue::new("jobs");
        for n in 0..3u8 {
            queue.enqueue(vec![n]).await.unwrap();
        }

        let batch = queue.receive(2).await.unwrap();
        assert_eq!(batch.iter().map(|d| d.payload[0]).collect::<Vec<_>>(), vec![0, 1]);
        assert!(batch.iter().all(|d| d.attempt == 1));

        for delivery in &batch {
            queue.ack(delivery).await.unwrap();
        }
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats, QueueStats { ready: 1, in_flight: 0, dead: 0 });
    }

    #[tokio::test]
    async fn test_release_redelivers_then_dead_letters() {
        let queue = InMemoryJobQueue::with_max_attempts("jobs", 2);
        queue.enqueue(b"page".to_vec()).await.unwrap();

        let first = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(queue.release(&first, "boom").await.unwrap(), ReleaseOutcome::Requeued);

        let second = queue.receive(1).await.unwrap().remove(0);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.id, first.id);
        assert_eq!(queue.release(&second, "boom").await.unwrap(), ReleaseOutcome::DeadLettered);

        assert!(queue.receive(1).await.unwrap().is_empty());
        assert_eq!(queue.dead_letters().await, vec![b"page".to_vec()]);
        assert!(queue.stats().await.unwrap().is_drained());
    }
}
