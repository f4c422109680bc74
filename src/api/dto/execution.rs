use crate::models::{Execution, ExecutionStatus};
use serde::Serialize;

/// Execution as observed by polling. Output fields appear only once the
/// execution is terminal.
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub execution_id: String,
    pub session_id: String,
    pub status: ExecutionStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<bool>,
}

impl From<Execution> for ExecutionResponse {
    fn from(execution: Execution) -> Self {
        let terminal = execution.status.is_terminal();
        Self {
            execution_id: execution.id,
            session_id: execution.session_id,
            status: execution.status,
            created_at: execution.created_at.to_rfc3339(),
            stdout: if terminal { execution.stdout } else { None },
            stderr: if terminal { execution.stderr } else { None },
            execution_time_ms: if terminal {
                execution.execution_time_ms
            } else {
                None
            },
            exit_code: if terminal { execution.exit_code } else { None },
            timeout: terminal.then_some(execution.timeout),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutionsListResponse {
    pub session_id: String,
    pub executions: Vec<ExecutionResponse>,
}
