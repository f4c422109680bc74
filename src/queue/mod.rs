//! Reliable FIFO job queue with bounded retries, exponential backoff and a
//! visibility timeout.
//!
//! Delivery is at-least-once: a reserved-but-unacked job returns to the ready
//! set once its reservation expires, so consumers must persist results
//! idempotently (here, keyed by execution id). Failed-out jobs are retained
//! in a dead set where they stay queryable.

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 2000;

/// Payload of one run request. The execution id doubles as the job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJob {
    pub execution_id: String,
    pub session_id: String,
    pub time_limit_ms: i64,
    pub memory_limit_mb: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub attempts: u32,
    pub backoff_initial_ms: u64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
        }
    }
}

/// A reserved delivery. `attempts_made` counts prior failed attempts, so the
/// first delivery of a job carries 0.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub payload: RunJob,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl Job {
    pub fn is_last_attempt(&self) -> bool {
        self.attempts_made + 1 >= self.max_attempts
    }
}

/// A job that exhausted its attempts, retained for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadJob {
    pub id: String,
    pub payload: RunJob,
    pub attempts_made: u32,
    pub error: String,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("Unknown job id: {0}")]
    UnknownJob(String),

    #[error("Broker error: {0}")]
    Broker(#[from] ::redis::RedisError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Delay before the retry following `attempts_made` failed attempts.
pub fn backoff_delay_ms(backoff_initial_ms: u64, attempts_made: u32) -> u64 {
    backoff_initial_ms.saturating_mul(1u64 << attempts_made.min(16))
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue under `payload.execution_id`. A job id already present in any
    /// state is rejected with [`QueueError::DuplicateJob`].
    async fn enqueue(&self, payload: RunJob, options: EnqueueOptions) -> Result<(), QueueError>;

    /// Reserve the next ready job, if any. Polling; expired reservations and
    /// due retries are promoted back to the ready set first.
    async fn reserve(&self, worker_id: &str) -> Result<Option<Job>, QueueError>;

    /// Remove a finished job.
    async fn ack(&self, job: &Job) -> Result<(), QueueError>;

    /// Record a failed attempt: reschedule with exponential backoff, or move
    /// the job to the dead set once attempts are exhausted.
    async fn nack(&self, job: &Job, error: &str) -> Result<(), QueueError>;

    /// Jobs retained after exhausting their attempts.
    async fn dead_jobs(&self) -> Result<Vec<DeadJob>, QueueError>;
}

pub type SharedQueue = Arc<dyn JobQueue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay_ms(2000, 0), 2000);
        assert_eq!(backoff_delay_ms(2000, 1), 4000);
        assert_eq!(backoff_delay_ms(2000, 2), 8000);
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        assert!(backoff_delay_ms(u64::MAX, 3) == u64::MAX);
        assert!(backoff_delay_ms(2000, u32::MAX) > 0);
    }

    #[test]
    fn last_attempt_detection() {
        let job = Job {
            id: "j".into(),
            payload: RunJob {
                execution_id: "j".into(),
                session_id: "s".into(),
                time_limit_ms: 5000,
                memory_limit_mb: 256,
            },
            attempts_made: 0,
            max_attempts: 3,
        };
        assert!(!job.is_last_attempt());
        assert!(
            Job {
                attempts_made: 2,
                ..job
            }
            .is_last_attempt()
        );
    }
}
