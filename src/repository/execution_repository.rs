use crate::error::{AppError, Result};
use crate::models::{Execution, ExecutionStatus};
use crate::repository::DbPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TERMINAL_GUARD: &str = "status NOT IN ('COMPLETED', 'FAILED', 'TIMEOUT')";

/// System of record for executions. All writes are single-row UPDATEs guarded
/// by the current status, so redelivered jobs and racing workers cannot move
/// a row backwards or touch a terminal row.
#[derive(Clone)]
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_queued(&self, session_id: &str) -> Result<Execution> {
        let execution = Execution {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            status: ExecutionStatus::Queued,
            stdout: None,
            stderr: None,
            execution_time_ms: None,
            exit_code: None,
            timeout: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO executions (id, session_id, status, timeout, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.session_id)
        .bind(execution.status)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await?;

        Ok(execution)
    }

    pub async fn get(&self, id: &str) -> Result<Execution> {
        self.try_get(id)
            .await?
            .ok_or_else(|| AppError::ExecutionNotFound(id.to_string()))
    }

    pub async fn try_get(&self, id: &str) -> Result<Option<Execution>> {
        let execution = sqlx::query_as::<_, Execution>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(execution)
    }

    pub async fn list_by_session(&self, session_id: &str, limit: i64) -> Result<Vec<Execution>> {
        let executions = sqlx::query_as::<_, Execution>(
            r#"
            SELECT * FROM executions
            WHERE session_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }

    /// Move a row to RUNNING and stamp `started_at`. A row already RUNNING
    /// (redelivery after a worker crash) is restamped so the repair sweep
    /// measures the live attempt; terminal rows are left alone.
    pub async fn mark_running(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'RUNNING', started_at = ?
            WHERE id = ? AND status IN ('QUEUED', 'RUNNING')
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write the terminal result. Returns false when the row was already
    /// terminal, which makes at-least-once redelivery harmless.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        stdout: Option<&str>,
        stderr: Option<&str>,
        execution_time_ms: Option<i64>,
        exit_code: Option<i64>,
        timed_out: bool,
    ) -> Result<bool> {
        debug_assert!(status.is_terminal());

        let sql = format!(
            r#"
            UPDATE executions
            SET status = ?, stdout = ?, stderr = ?, execution_time_ms = ?,
                exit_code = ?, timeout = ?, finished_at = ?
            WHERE id = ? AND {TERMINAL_GUARD}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(status)
            .bind(stdout)
            .bind(stderr)
            .bind(execution_time_ms)
            .bind(exit_code)
            .bind(timed_out)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_failed(&self, id: &str, stderr: &str) -> Result<bool> {
        self.finish(
            id,
            ExecutionStatus::Failed,
            None,
            Some(stderr),
            None,
            None,
            false,
        )
        .await
    }

    pub async fn count_recent(&self, session_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM executions WHERE session_id = ? AND created_at > ?",
        )
        .bind(session_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn count_recent_failed(
        &self,
        session_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM executions
            WHERE session_id = ? AND created_at > ? AND status = 'FAILED'
            "#,
        )
        .bind(session_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Relabel executions stuck in RUNNING since before `cutoff` as FAILED
    /// ("worker lost"). Returns the affected ids.
    pub async fn sweep_stuck_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE executions
            SET status = 'FAILED', stderr = 'worker lost', timeout = 0, finished_at = ?
            WHERE status = 'RUNNING' AND started_at < ?
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{SessionRepository, establish_connection, seed_languages};
    use chrono::Duration;

    async fn setup() -> (DbPool, String) {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        seed_languages(&pool, 5000, 256).await.unwrap();
        let session = SessionRepository::new(pool.clone())
            .create("shell", "echo hi")
            .await
            .unwrap();
        (pool, session.id)
    }

    #[tokio::test]
    async fn fresh_execution_is_queued() {
        let (pool, session_id) = setup().await;
        let repo = ExecutionRepository::new(pool);

        let execution = repo.create_queued(&session_id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Queued);

        let fetched = repo.get(&execution.id).await.unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Queued);
        assert!(fetched.started_at.is_none());
        assert!(fetched.finished_at.is_none());
        assert!(!fetched.timeout);
    }

    #[tokio::test]
    async fn mark_running_stamps_started_at_once_queued() {
        let (pool, session_id) = setup().await;
        let repo = ExecutionRepository::new(pool);
        let execution = repo.create_queued(&session_id).await.unwrap();

        assert!(repo.mark_running(&execution.id).await.unwrap());
        let row = repo.get(&execution.id).await.unwrap();
        assert_eq!(row.status, ExecutionStatus::Running);
        assert!(row.started_at.is_some());

        // Redelivery of a still-RUNNING row restamps rather than failing.
        assert!(repo.mark_running(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn terminal_rows_are_immutable() {
        let (pool, session_id) = setup().await;
        let repo = ExecutionRepository::new(pool);
        let execution = repo.create_queued(&session_id).await.unwrap();
        repo.mark_running(&execution.id).await.unwrap();

        let wrote = repo
            .finish(
                &execution.id,
                ExecutionStatus::Completed,
                Some("out"),
                Some(""),
                Some(12),
                Some(0),
                false,
            )
            .await
            .unwrap();
        assert!(wrote);

        // A second terminal write (redelivered job) is a no-op.
        let wrote_again = repo
            .finish(
                &execution.id,
                ExecutionStatus::Failed,
                None,
                Some("boom"),
                None,
                Some(1),
                false,
            )
            .await
            .unwrap();
        assert!(!wrote_again);

        let row = repo.get(&execution.id).await.unwrap();
        assert_eq!(row.status, ExecutionStatus::Completed);
        assert_eq!(row.stdout.as_deref(), Some("out"));
        assert_eq!(row.exit_code, Some(0));
        assert!(row.finished_at.is_some());

        // And RUNNING cannot be re-entered either.
        assert!(!repo.mark_running(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn recent_counts_cover_the_window() {
        let (pool, session_id) = setup().await;
        let repo = ExecutionRepository::new(pool);

        for _ in 0..3 {
            repo.create_queued(&session_id).await.unwrap();
        }
        let failed = repo.create_queued(&session_id).await.unwrap();
        repo.mark_running(&failed.id).await.unwrap();
        repo.mark_failed(&failed.id, "exit 1").await.unwrap();

        let since = Utc::now() - Duration::seconds(60);
        assert_eq!(repo.count_recent(&session_id, since).await.unwrap(), 4);
        assert_eq!(
            repo.count_recent_failed(&session_id, since).await.unwrap(),
            1
        );

        // Nothing is counted outside the window.
        let future = Utc::now() + Duration::seconds(1);
        assert_eq!(repo.count_recent(&session_id, future).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_relabels_only_stale_running_rows() {
        let (pool, session_id) = setup().await;
        let repo = ExecutionRepository::new(pool);

        let stale = repo.create_queued(&session_id).await.unwrap();
        repo.mark_running(&stale.id).await.unwrap();
        let queued = repo.create_queued(&session_id).await.unwrap();

        // Cutoff in the future makes the RUNNING row "stale".
        let swept = repo
            .sweep_stuck_running(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(swept, vec![stale.id.clone()]);

        let row = repo.get(&stale.id).await.unwrap();
        assert_eq!(row.status, ExecutionStatus::Failed);
        assert_eq!(row.stderr.as_deref(), Some("worker lost"));
        assert!(row.finished_at.is_some());

        // QUEUED rows are not the sweep's business.
        let untouched = repo.get(&queued.id).await.unwrap();
        assert_eq!(untouched.status, ExecutionStatus::Queued);

        // A second sweep finds nothing.
        let swept = repo
            .sweep_stuck_running(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert!(swept.is_empty());
    }
}
