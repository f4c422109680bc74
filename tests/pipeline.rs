//! End-to-end pipeline tests: admission → queue → worker → terminal row,
//! hermetic against an in-memory database, the embedded queue and the
//! seeded shell runtime.

use runbox::events::{EventLog, MemoryEventLog};
use runbox::models::{Execution, ExecutionStatus};
use runbox::queue::MemoryQueue;
use runbox::repository::{
    ExecutionRepository, LanguageRepository, SessionRepository, establish_connection,
    seed_languages,
};
use runbox::services::{ExecutionService, SessionService};
use runbox::worker::WorkerPool;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Pipeline {
    session_service: SessionService,
    execution_service: ExecutionService,
    execution_repo: ExecutionRepository,
    events: Arc<MemoryEventLog>,
    worker_shutdown: Arc<Notify>,
    worker_task: JoinHandle<()>,
}

impl Pipeline {
    async fn start() -> Self {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        seed_languages(&pool, 5000, 256).await.unwrap();

        let language_repo = LanguageRepository::new(pool.clone());
        let session_repo = SessionRepository::new(pool.clone());
        let execution_repo = ExecutionRepository::new(pool);

        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(90)));
        let events = Arc::new(MemoryEventLog::new());

        let session_service = SessionService::new(
            session_repo.clone(),
            language_repo.clone(),
            execution_repo.clone(),
        );
        let execution_service = ExecutionService::new(
            execution_repo.clone(),
            session_repo.clone(),
            language_repo.clone(),
            queue.clone(),
            events.clone(),
            5000,
            256,
        );

        let worker = WorkerPool::new(
            queue,
            execution_repo.clone(),
            session_repo,
            language_repo,
            events.clone(),
            4,
        )
        .with_poll_interval(Duration::from_millis(20));
        let worker_shutdown = worker.shutdown_handle();
        let worker_task =
            tokio::spawn(async move { worker.run(Duration::from_secs(10)).await });

        Self {
            session_service,
            execution_service,
            execution_repo,
            events,
            worker_shutdown,
            worker_task,
        }
    }

    async fn submit_source(
        &self,
        source: &str,
        time_limit_ms: Option<i64>,
    ) -> (String, Execution) {
        let (session, _) = self.session_service.create_session("shell").await.unwrap();
        self.session_service
            .update_source(&session.id, source)
            .await
            .unwrap();
        let execution = self
            .execution_service
            .submit(&session.id, time_limit_ms, None)
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Queued);
        (session.id, execution)
    }

    async fn await_terminal(&self, execution_id: &str) -> Execution {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        loop {
            let row = self.execution_repo.get(execution_id).await.unwrap();
            if row.status.is_terminal() {
                return row;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "execution {execution_id} stuck in {:?}",
                row.status
            );
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    }

    async fn stop(self) {
        self.worker_shutdown.notify_one();
        self.worker_task.await.unwrap();
    }
}

#[tokio::test]
async fn happy_path_runs_to_completion() {
    let pipeline = Pipeline::start().await;
    let (_, execution) = pipeline.submit_source("echo Hello World", None).await;

    let row = pipeline.await_terminal(&execution.id).await;
    assert_eq!(row.status, ExecutionStatus::Completed);
    assert_eq!(row.stdout.as_deref(), Some("Hello World\n"));
    assert_eq!(row.stderr.as_deref(), Some(""));
    assert_eq!(row.exit_code, Some(0));
    assert!(!row.timeout);
    assert!(row.execution_time_ms.unwrap() >= 0);
    assert!(row.started_at.unwrap() <= row.finished_at.unwrap());

    // Lifecycle breadcrumbs follow the status sequence.
    let stages: Vec<_> = pipeline
        .events
        .list(&execution.id)
        .await
        .into_iter()
        .map(|e| e.stage)
        .collect();
    assert_eq!(
        stages,
        vec![
            ExecutionStatus::Queued,
            ExecutionStatus::Running,
            ExecutionStatus::Completed
        ]
    );

    pipeline.stop().await;
}

#[tokio::test]
async fn long_running_source_times_out() {
    let pipeline = Pipeline::start().await;
    let (_, execution) = pipeline.submit_source("sleep 30", Some(500)).await;

    let row = pipeline.await_terminal(&execution.id).await;
    assert_eq!(row.status, ExecutionStatus::Timeout);
    assert!(row.timeout);
    assert_eq!(row.exit_code, None);
    let elapsed = row.execution_time_ms.unwrap();
    assert!((400..=5000).contains(&elapsed), "elapsed {elapsed}ms");
    assert!(!row.stderr.as_deref().unwrap_or_default().is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn runtime_error_surfaces_the_exit_code() {
    let pipeline = Pipeline::start().await;
    let (_, execution) = pipeline.submit_source("echo x\nexit 7", None).await;

    let row = pipeline.await_terminal(&execution.id).await;
    assert_eq!(row.status, ExecutionStatus::Failed);
    assert_eq!(row.exit_code, Some(7));
    assert_eq!(row.stdout.as_deref(), Some("x\n"));
    assert!(!row.stderr.as_deref().unwrap_or_default().is_empty());

    pipeline.stop().await;
}

#[tokio::test]
async fn concurrent_submissions_all_terminate() {
    let pipeline = Pipeline::start().await;

    let mut executions = Vec::new();
    for i in 0..5 {
        let (_, execution) = pipeline
            .submit_source(&format!("echo run-{i}"), None)
            .await;
        executions.push((i, execution));
    }

    for (i, execution) in executions {
        let row = pipeline.await_terminal(&execution.id).await;
        assert_eq!(row.status, ExecutionStatus::Completed);
        assert_eq!(row.stdout.as_deref(), Some(format!("run-{i}\n").as_str()));
    }

    pipeline.stop().await;
}

#[tokio::test]
async fn closed_session_history_stays_readable() {
    let pipeline = Pipeline::start().await;
    let (session_id, execution) = pipeline.submit_source("echo archived", None).await;
    pipeline.await_terminal(&execution.id).await;

    pipeline.session_service.close_session(&session_id).await.unwrap();

    // New runs are refused, old results remain visible.
    assert!(
        pipeline
            .execution_service
            .submit(&session_id, None, None)
            .await
            .is_err()
    );
    let history = pipeline
        .session_service
        .list_executions(&session_id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Completed);

    pipeline.stop().await;
}
