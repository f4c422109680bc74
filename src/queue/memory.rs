use super::{
    DeadJob, EnqueueOptions, Job, JobQueue, QueueError, RunJob, backoff_delay_ms,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
enum JobState {
    Ready,
    Delayed { until: Instant },
    Reserved { deadline: Instant },
    Dead { error: String },
}

#[derive(Debug)]
struct JobEntry {
    payload: RunJob,
    attempts_made: u32,
    max_attempts: u32,
    backoff_initial_ms: u64,
    state: JobState,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, JobEntry>,
    ready: VecDeque<String>,
}

/// In-process queue for embedded deployments and tests. Same contract as the
/// broker-backed queue: FIFO ready set, exponential retry, visibility
/// timeout, dead retention.
pub struct MemoryQueue {
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn promote_due(state: &mut QueueState, now: Instant) {
        let mut due = Vec::new();
        for (id, entry) in &state.jobs {
            let ready = match entry.state {
                JobState::Delayed { until } => until <= now,
                JobState::Reserved { deadline } => deadline <= now,
                _ => false,
            };
            if ready {
                due.push(id.clone());
            }
        }

        // Deterministic promotion order across map iteration.
        due.sort();
        for id in due {
            if let Some(entry) = state.jobs.get_mut(&id) {
                entry.state = JobState::Ready;
                state.ready.push_back(id);
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, payload: RunJob, options: EnqueueOptions) -> Result<(), QueueError> {
        let id = payload.execution_id.clone();
        let mut state = self.state.lock().expect("queue lock poisoned");

        if state.jobs.contains_key(&id) {
            return Err(QueueError::DuplicateJob(id));
        }

        state.jobs.insert(
            id.clone(),
            JobEntry {
                payload,
                attempts_made: 0,
                max_attempts: options.attempts.max(1),
                backoff_initial_ms: options.backoff_initial_ms,
                state: JobState::Ready,
            },
        );
        state.ready.push_back(id);
        Ok(())
    }

    async fn reserve(&self, _worker_id: &str) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().expect("queue lock poisoned");
        Self::promote_due(&mut state, now);

        while let Some(id) = state.ready.pop_front() {
            let Some(entry) = state.jobs.get_mut(&id) else {
                continue;
            };
            // The ready deque may hold stale ids for jobs that moved on.
            if !matches!(entry.state, JobState::Ready) {
                continue;
            }

            entry.state = JobState::Reserved {
                deadline: now + self.visibility_timeout,
            };
            return Ok(Some(Job {
                id: id.clone(),
                payload: entry.payload.clone(),
                attempts_made: entry.attempts_made,
                max_attempts: entry.max_attempts,
            }));
        }

        Ok(None)
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.jobs.remove(&job.id);
        Ok(())
    }

    async fn nack(&self, job: &Job, error: &str) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().expect("queue lock poisoned");
        let entry = state
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| QueueError::UnknownJob(job.id.clone()))?;

        let delay = backoff_delay_ms(entry.backoff_initial_ms, entry.attempts_made);
        entry.attempts_made += 1;

        if entry.attempts_made >= entry.max_attempts {
            entry.state = JobState::Dead {
                error: error.to_string(),
            };
        } else {
            entry.state = JobState::Delayed {
                until: now + Duration::from_millis(delay),
            };
        }
        Ok(())
    }

    async fn dead_jobs(&self) -> Result<Vec<DeadJob>, QueueError> {
        let state = self.state.lock().expect("queue lock poisoned");
        let mut dead: Vec<DeadJob> = state
            .jobs
            .iter()
            .filter_map(|(id, entry)| match &entry.state {
                JobState::Dead { error } => Some(DeadJob {
                    id: id.clone(),
                    payload: entry.payload.clone(),
                    attempts_made: entry.attempts_made,
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect();
        dead.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(dead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VISIBILITY: Duration = Duration::from_secs(90);

    fn payload(id: &str) -> RunJob {
        RunJob {
            execution_id: id.to_string(),
            session_id: "session".to_string(),
            time_limit_ms: 5000,
            memory_limit_mb: 256,
        }
    }

    #[tokio::test]
    async fn fifo_delivery_and_empty_poll() {
        let queue = MemoryQueue::new(VISIBILITY);
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();
        queue
            .enqueue(payload("b"), EnqueueOptions::default())
            .await
            .unwrap();

        let first = queue.reserve("w1").await.unwrap().unwrap();
        let second = queue.reserve("w1").await.unwrap().unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(second.id, "b");
        assert_eq!(first.attempts_made, 0);
        assert!(queue.reserve("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_job_ids_are_rejected_until_acked() {
        let queue = MemoryQueue::new(VISIBILITY);
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();

        let err = queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(id) if id == "a"));

        let job = queue.reserve("w1").await.unwrap().unwrap();
        queue.ack(&job).await.unwrap();

        // Once removed, the id is free again.
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ack_removes_the_job_for_good() {
        let queue = MemoryQueue::new(VISIBILITY);
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();
        let job = queue.reserve("w1").await.unwrap().unwrap();
        queue.ack(&job).await.unwrap();

        assert!(queue.reserve("w1").await.unwrap().is_none());
        assert!(queue.dead_jobs().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nack_backs_off_exponentially_then_dies() {
        let queue = MemoryQueue::new(VISIBILITY);
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();

        // Attempt 1 fails: retry due 2s later.
        let job = queue.reserve("w1").await.unwrap().unwrap();
        queue.nack(&job, "io").await.unwrap();
        assert!(queue.reserve("w1").await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(2001)).await;

        // Attempt 2 fails: retry due 4s later.
        let job = queue.reserve("w1").await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 1);
        queue.nack(&job, "io").await.unwrap();
        tokio::time::advance(Duration::from_millis(2001)).await;
        assert!(queue.reserve("w1").await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(2000)).await;

        // Attempt 3 fails: attempts exhausted, job moves to the dead set.
        let job = queue.reserve("w1").await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
        assert!(job.is_last_attempt());
        queue.nack(&job, "still broken").await.unwrap();

        assert!(queue.reserve("w1").await.unwrap().is_none());
        let dead = queue.dead_jobs().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, "a");
        assert_eq!(dead[0].attempts_made, 3);
        assert_eq!(dead[0].error, "still broken");

        // Dead jobs still hold their id for deduplication.
        let err = queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_reservations_are_redelivered() {
        let queue = MemoryQueue::new(VISIBILITY);
        queue
            .enqueue(payload("a"), EnqueueOptions::default())
            .await
            .unwrap();

        let job = queue.reserve("w1").await.unwrap().unwrap();
        assert!(queue.reserve("w2").await.unwrap().is_none());

        // Worker w1 crashes without ack; after the visibility timeout the
        // job is handed to another worker with attempts unchanged.
        tokio::time::advance(VISIBILITY + Duration::from_secs(1)).await;
        let redelivered = queue.reserve("w2").await.unwrap().unwrap();
        assert_eq!(redelivered.id, job.id);
        assert_eq!(redelivered.attempts_made, 0);
    }
}
