use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::webhook::EmployeeData;

/// Job payload serialized into the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_id: Uuid,
    pub employee: EmployeeData,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job_id: Uuid, employee: EmployeeData) -> Self {
        Self {
            job_id,
            employee,
            enqueued_at: Utc::now(),
        }
    }
}

/// A job handed to exactly one consumer.
///
/// `receipt` identifies the in-flight entry so it can be acknowledged.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: QueuedJob,
    pub receipt: String,
}

/// Hand-off between the webhook receiver and the workers.
///
/// Delivery is at-least-once: an entry stays in flight until it is acked
/// or handed back, so consumers must tolerate seeing a job twice.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next job.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Drop a delivered job from the in-flight list.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return a delivered job to the head of the queue.
    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move every in-flight entry back onto the queue. Returns how many
    /// entries were moved.
    ///
    /// Meant for worker startup, where in-flight entries belong to consumers
    /// that died before acking.
    async fn recover(&self) -> Result<u64, QueueError>;

    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed reliable queue.
///
/// `LPUSH` onto `<name>:pending`, `BLMOVE` into `<name>:processing` on
/// dequeue, `LREM` from the processing list on ack.
pub struct RedisJobQueue {
    client: redis::Client,
    pending_key: String,
    processing_key: String,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            pending_key: format!("{queue_name}:pending"),
            processing_key: format!("{queue_name}:processing"),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(&self.pending_key, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedJob>(&payload) {
            Ok(job) => Ok(Some(Delivery {
                job,
                receipt: payload,
            })),
            Err(e) => {
                // A poison entry would otherwise sit in the processing list forever.
                conn.lrem::<_, _, ()>(&self.processing_key, 1, &payload)
                    .await
                    .map_err(QueueError::Redis)?;
                Err(QueueError::Serialize(e))
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.receipt)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        // Dequeue pops from the right, so RPUSH makes it the next delivery.
        redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &delivery.receipt)
            .ignore()
            .rpush(&self.pending_key, &delivery.receipt)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut moved = 0;
        loop {
            // Newest first onto the right end leaves the oldest entry next in line.
            let entry: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.pending_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(QueueError::Redis)?;
            if entry.is_none() {
                return Ok(moved);
            }
            moved += 1;
        }
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn
            .llen(&self.pending_key)
            .await
            .map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// Process-local queue for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryJobQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
    in_flight: Mutex<HashMap<String, QueuedJob>>,
    deliveries: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the queue unavailable; further calls fail with `QueueError::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedJob>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, QueuedJob>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pop(&self) -> Option<Delivery> {
        let job = self.pending().pop_front()?;
        let seq = self.deliveries.fetch_add(1, Ordering::SeqCst);
        let receipt = format!("{}:{seq}", job.job_id);
        self.in_flight().insert(receipt.clone(), job.clone());
        Some(Delivery { job, receipt })
    }

    /// Deliveries neither acked nor handed back.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &QueuedJob) -> Result<(), QueueError> {
        self.ensure_open()?;
        self.pending().push_back(job.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            let notified = self.notify.notified();
            if let Some(delivery) = self.pop() {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.ensure_open()?;
        self.in_flight().remove(&delivery.receipt);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.ensure_open()?;
        if let Some(job) = self.in_flight().remove(&delivery.receipt) {
            self.pending().push_front(job);
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        self.ensure_open()?;
        let stranded: Vec<QueuedJob> = self.in_flight().drain().map(|(_, job)| job).collect();
        let moved = stranded.len() as u64;
        {
            let mut pending = self.pending();
            for job in stranded {
                pending.push_front(job);
            }
        }
        if moved > 0 {
            self.notify.notify_waiters();
        }
        Ok(moved)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        self.ensure_open()?;
        Ok(self.pending().len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.ensure_open()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue is closed")]
    Closed,
}
