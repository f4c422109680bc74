//! Execution worker pool.
//!
//! Workers reserve jobs with bounded concurrency, drive the runner and
//! persist outcomes. Failure handling splits three ways: transient
//! infrastructure errors are nacked so the queue retries with backoff;
//! deterministic failures (missing session, unsupported runtime) write a
//! terminal FAILED row and ack; code-level failures (non-zero exit, timeout,
//! compile error) are ordinary outcomes and ack. Result writes are
//! idempotent on the execution id, so at-least-once delivery is safe.

mod sweep;

pub use sweep::RepairSweep;

use crate::events::{EventMeta, LifecycleEvent, SharedEventLog};
use crate::models::{ExecutionStatus, Language, Session};
use crate::queue::{Job, SharedQueue};
use crate::repository::{ExecutionRepository, LanguageRepository, SessionRepository};
use crate::runner::{Runner, RunnerOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct WorkerPool {
    queue: SharedQueue,
    execution_repo: ExecutionRepository,
    session_repo: SessionRepository,
    language_repo: LanguageRepository,
    events: SharedEventLog,
    runner: Runner,
    concurrency: usize,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(
        queue: SharedQueue,
        execution_repo: ExecutionRepository,
        session_repo: SessionRepository,
        language_repo: LanguageRepository,
        events: SharedEventLog,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            execution_repo,
            session_repo,
            language_repo,
            events,
            runner: Runner::new(),
            concurrency: concurrency.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Handle used to signal shutdown from outside the run loop.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Reserve-and-dispatch loop. On shutdown, stops reserving, gives
    /// in-flight executions `grace` to finish, then aborts the rest (their
    /// child processes die with the tasks; the repair sweep reclaims any
    /// rows left RUNNING).
    pub async fn run(&self, grace: Duration) {
        let worker_id = format!("worker-{}", Uuid::new_v4().simple());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut inflight: JoinSet<()> = JoinSet::new();

        tracing::info!(
            worker_id = %worker_id,
            concurrency = self.concurrency,
            "Worker pool started"
        );

        loop {
            let permit = tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,

                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // Reap completed tasks so the join set does not grow unbounded.
            while inflight.try_join_next().is_some() {}

            match self.queue.reserve(&worker_id).await {
                Ok(Some(job)) => {
                    let pool = self.clone();
                    inflight.spawn(async move {
                        pool.process_job(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        biased;
                        _ = self.shutdown.notified() => break,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(worker_id = %worker_id, "Failed to reserve job: {}", e);
                    drop(permit);
                    tokio::select! {
                        biased;
                        _ = self.shutdown.notified() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        if !inflight.is_empty() {
            tracing::info!(
                in_flight = inflight.len(),
                grace_secs = grace.as_secs(),
                "Worker pool draining"
            );
        }
        let drained = tokio::time::timeout(grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                aborted = inflight.len(),
                "Grace period elapsed; aborting remaining executions"
            );
            inflight.abort_all();
            while inflight.join_next().await.is_some() {}
        }

        tracing::info!(worker_id = %worker_id, "Worker pool stopped");
    }

    async fn process_job(&self, job: Job) {
        let execution_id = job.payload.execution_id.clone();
        let attempt = job.attempts_made + 1;
        tracing::debug!(execution_id = %execution_id, attempt, "Processing job");

        if let Err(transient) = self.try_process(&job, attempt).await {
            tracing::warn!(
                execution_id = %execution_id,
                attempt,
                max_attempts = job.max_attempts,
                "Transient worker failure: {}",
                transient
            );

            if job.is_last_attempt() {
                // The queue is about to give up on this job; make one more
                // attempt to leave a terminal row so the execution does not
                // sit in RUNNING until the repair sweep finds it.
                let stderr =
                    format!("Worker failed after {attempt} attempts: {transient}");
                match self.execution_repo.mark_failed(&execution_id, &stderr).await {
                    Ok(true) => {
                        self.append_event(
                            &execution_id,
                            ExecutionStatus::Failed,
                            EventMeta {
                                attempt: Some(attempt),
                                error: Some(transient.clone()),
                                ..EventMeta::default()
                            },
                        )
                        .await;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::error!(
                        execution_id = %execution_id,
                        "Final FAILED write also failed; repair sweep will reclaim: {}",
                        e
                    ),
                }
            }

            if let Err(e) = self.queue.nack(&job, &transient).await {
                tracing::warn!(execution_id = %execution_id, "Failed to nack job: {}", e);
            }
        }
    }

    /// One delivery attempt. `Err` means a transient infrastructure failure
    /// the caller should nack; deterministic and code-level failures are
    /// fully handled here and return `Ok`.
    async fn try_process(&self, job: &Job, attempt: u32) -> Result<(), String> {
        let payload = &job.payload;
        let execution_id = &payload.execution_id;

        let Some(execution) = self
            .execution_repo
            .try_get(execution_id)
            .await
            .map_err(stringify)?
        else {
            // A job without a row is an admission bug, not ours to retry.
            tracing::error!(
                execution_id = %execution_id,
                "Job references a missing execution row; dropping"
            );
            return self.queue.ack(job).await.map_err(stringify);
        };

        if execution.status.is_terminal() {
            tracing::debug!(
                execution_id = %execution_id,
                status = execution.status.as_str(),
                "Redelivered job for a finished execution; acking"
            );
            return self.queue.ack(job).await.map_err(stringify);
        }

        if !self
            .execution_repo
            .mark_running(execution_id)
            .await
            .map_err(stringify)?
        {
            // Lost the race against a terminal write.
            return self.queue.ack(job).await.map_err(stringify);
        }
        self.append_event(
            execution_id,
            ExecutionStatus::Running,
            EventMeta {
                attempt: Some(attempt),
                ..EventMeta::default()
            },
        )
        .await;

        let outcome = match self.load_context(payload.session_id.as_str()).await? {
            LoadedContext::Ready(session, language) => {
                self.runner
                    .run(
                        &language,
                        &session.source_code,
                        payload.time_limit_ms,
                        payload.memory_limit_mb,
                    )
                    .await
                    .map_err(stringify)?
            }
            LoadedContext::Gone(stderr) => RunnerOutcome::failed(stderr, 1, 0),
        };

        let wrote = self
            .execution_repo
            .finish(
                execution_id,
                outcome.status,
                Some(&outcome.stdout),
                Some(&outcome.stderr),
                Some(outcome.execution_time_ms),
                outcome.exit_code,
                outcome.timed_out,
            )
            .await
            .map_err(stringify)?;

        if wrote {
            self.append_event(
                execution_id,
                outcome.status,
                EventMeta {
                    attempt: Some(attempt),
                    execution_time_ms: Some(outcome.execution_time_ms),
                    exit_code: outcome.exit_code,
                    ..EventMeta::default()
                },
            )
            .await;
            tracing::info!(
                execution_id = %execution_id,
                status = outcome.status.as_str(),
                execution_time_ms = outcome.execution_time_ms,
                "Execution finished"
            );
        }

        self.queue.ack(job).await.map_err(stringify)
    }

    async fn load_context(&self, session_id: &str) -> Result<LoadedContext, String> {
        let Some(session) = self
            .session_repo
            .try_get(session_id)
            .await
            .map_err(stringify)?
        else {
            // Deterministic: the session will not come back, retrying is useless.
            return Ok(LoadedContext::Gone(format!(
                "Session no longer exists: {session_id}"
            )));
        };

        match self.language_repo.get(&session.language_id).await {
            Ok(language) => Ok(LoadedContext::Ready(Box::new(session), Box::new(language))),
            Err(crate::error::AppError::LanguageNotFound(id)) => Ok(LoadedContext::Gone(
                format!("Language no longer exists: {id}"),
            )),
            Err(e) => Err(stringify(e)),
        }
    }

    async fn append_event(&self, execution_id: &str, stage: ExecutionStatus, meta: EventMeta) {
        self.events
            .append(LifecycleEvent::now(execution_id, stage, meta))
            .await;
    }
}

enum LoadedContext {
    Ready(Box<Session>, Box<Language>),
    Gone(String),
}

fn stringify<E: std::fmt::Display>(e: E) -> String {
    e.to_string()
}
