use crate::error::{AppError, Result};
use crate::events::{EventMeta, LifecycleEvent, SharedEventLog};
use crate::models::{Execution, ExecutionStatus, SessionStatus};
use crate::queue::{EnqueueOptions, QueueError, RunJob, SharedQueue};
use crate::repository::{ExecutionRepository, LanguageRepository, SessionRepository};
use crate::safety;

/// Admission path: one call turns a run request into a durable QUEUED row
/// plus a queued job, or a synchronous error. Everything after admission is
/// observed by polling the execution row.
#[derive(Clone)]
pub struct ExecutionService {
    execution_repo: ExecutionRepository,
    session_repo: SessionRepository,
    language_repo: LanguageRepository,
    queue: SharedQueue,
    events: SharedEventLog,
    default_time_limit_ms: i64,
    default_memory_mb: i64,
}

impl ExecutionService {
    pub fn new(
        execution_repo: ExecutionRepository,
        session_repo: SessionRepository,
        language_repo: LanguageRepository,
        queue: SharedQueue,
        events: SharedEventLog,
        default_time_limit_ms: i64,
        default_memory_mb: i64,
    ) -> Self {
        Self {
            execution_repo,
            session_repo,
            language_repo,
            queue,
            events,
            default_time_limit_ms,
            default_memory_mb,
        }
    }

    /// Checks run cheapest-first: parameter bounds, then the abuse window,
    /// then the session itself. The row insert must succeed before the
    /// enqueue; an enqueue failure afterwards marks the row FAILED so no
    /// execution is ever QUEUED without a job.
    pub async fn submit(
        &self,
        session_id: &str,
        time_limit_ms: Option<i64>,
        memory_limit_mb: Option<i64>,
    ) -> Result<Execution> {
        let time_limit_ms = time_limit_ms.unwrap_or(self.default_time_limit_ms);
        let memory_limit_mb = memory_limit_mb.unwrap_or(self.default_memory_mb);

        let violations = safety::validate_params(time_limit_ms, memory_limit_mb);
        if !violations.is_empty() {
            return Err(AppError::InvalidParameter(violations));
        }

        let verdict = safety::check_abuse(&self.execution_repo, session_id).await;
        if !verdict.allowed {
            return Err(AppError::RateLimited {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "Rate limit exceeded".to_string()),
                retry_after: verdict.retry_after_seconds,
            });
        }

        let session = self.session_repo.get(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(AppError::SessionClosed(session_id.to_string()));
        }

        let language = self.language_repo.get(&session.language_id).await?;
        if let Some(pattern) = safety::scan_loop_patterns(&session.source_code, language.runtime) {
            // Advisory only; the wall-clock timeout is the real safeguard.
            tracing::warn!(
                session_id,
                runtime = %language.runtime,
                "Suspicious loop pattern in submitted source: {}",
                pattern
            );
        }

        let execution = self.execution_repo.create_queued(session_id).await?;

        self.events
            .append(LifecycleEvent::now(
                &execution.id,
                ExecutionStatus::Queued,
                EventMeta {
                    session_id: Some(session_id.to_string()),
                    time_limit_ms: Some(time_limit_ms),
                    memory_limit_mb: Some(memory_limit_mb),
                    ..EventMeta::default()
                },
            ))
            .await;

        let job = RunJob {
            execution_id: execution.id.clone(),
            session_id: session_id.to_string(),
            time_limit_ms,
            memory_limit_mb,
        };
        match self.queue.enqueue(job, EnqueueOptions::default()).await {
            Ok(()) => {}
            Err(QueueError::DuplicateJob(id)) => {
                // The id is the execution id, so a duplicate means this exact
                // request is already queued. Nothing to do.
                tracing::debug!(execution_id = %id, "Job already queued");
            }
            Err(e) => {
                let stderr = format!("Failed to enqueue job: {e}");
                if let Err(write_err) = self.execution_repo.mark_failed(&execution.id, &stderr).await
                {
                    tracing::error!(
                        execution_id = %execution.id,
                        "Could not mark execution FAILED after enqueue error: {}",
                        write_err
                    );
                }
                return Err(e.into());
            }
        }

        tracing::info!(
            execution_id = %execution.id,
            session_id,
            time_limit_ms,
            memory_limit_mb,
            "Execution queued"
        );
        Ok(execution)
    }

    pub async fn get_execution(&self, id: &str) -> Result<Execution> {
        self.execution_repo.get(id).await
    }
}
