use crate::events::{EventMeta, LifecycleEvent, SharedEventLog};
use crate::models::ExecutionStatus;
use crate::repository::ExecutionRepository;
use crate::safety::MAX_TIME_LIMIT_MS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Periodic repair task for executions orphaned by a crashed worker.
///
/// Any row still RUNNING longer than the maximum time limit plus a margin
/// has no live process behind it (the runner would have killed or finished
/// it); it is relabeled FAILED with stderr "worker lost". This bounds how
/// long a client can observe RUNNING.
pub struct RepairSweep {
    execution_repo: ExecutionRepository,
    events: SharedEventLog,
    interval: Duration,
    margin: Duration,
    shutdown: Arc<Notify>,
}

impl RepairSweep {
    pub fn new(
        execution_repo: ExecutionRepository,
        events: SharedEventLog,
        interval: Duration,
        margin: Duration,
    ) -> Self {
        Self {
            execution_repo,
            events,
            interval,
            margin,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            margin_secs = self.margin.as_secs(),
            "Repair sweep started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => break,

                _ = tokio::time::sleep(self.interval) => {
                    self.sweep_once().await;
                }
            }
        }

        tracing::info!("Repair sweep stopped");
    }

    pub async fn sweep_once(&self) {
        let horizon = chrono::Duration::milliseconds(MAX_TIME_LIMIT_MS)
            + chrono::Duration::from_std(self.margin).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = chrono::Utc::now() - horizon;

        match self.execution_repo.sweep_stuck_running(cutoff).await {
            Ok(ids) => {
                for id in ids {
                    tracing::warn!(execution_id = %id, "Relabeled lost RUNNING execution as FAILED");
                    self.events
                        .append(LifecycleEvent::now(
                            &id,
                            ExecutionStatus::Failed,
                            EventMeta {
                                error: Some("worker lost".to_string()),
                                ..EventMeta::default()
                            },
                        ))
                        .await;
                }
            }
            Err(e) => tracing::warn!("Repair sweep failed: {}", e),
        }
    }
}
