use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attempt to run a session's source with specified limits.
///
/// The execution id doubles as the queue job id, which gives the queue a
/// natural deduplication key and makes result writes idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Execution {
    pub id: String,
    pub session_id: String,
    pub status: ExecutionStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub exit_code: Option<i64>,
    pub timeout: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of an execution row. The QUEUED → RUNNING → terminal ordering and
/// terminal immutability are enforced by the status-guarded UPDATEs in
/// `ExecutionRepository`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Timeout => "TIMEOUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionStatus::*;

    #[test]
    fn only_finished_states_are_terminal() {
        for terminal in [Completed, Failed, Timeout] {
            assert!(terminal.is_terminal());
        }
        assert!(!Queued.is_terminal());
        assert!(!Running.is_terminal());
    }
}
