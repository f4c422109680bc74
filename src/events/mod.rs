//! Ephemeral lifecycle event log.
//!
//! Events are debugging breadcrumbs: append-only lists keyed per execution,
//! expiring 30 minutes after the last write. They may be lost or reordered
//! and are never consulted for correctness; the durable execution row is the
//! system of record.

mod memory;
mod redis;

pub use self::memory::MemoryEventLog;
pub use self::redis::RedisEventLog;

use crate::models::ExecutionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const EVENT_TTL_SECS: u64 = 1800;

pub fn events_key(execution_id: &str) -> String {
    format!("execution:{execution_id}:events")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub execution_id: String,
    pub stage: ExecutionStatus,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub meta: EventMeta,
}

/// Fixed metadata fields; absent ones are omitted from the stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
}

impl LifecycleEvent {
    pub fn now(execution_id: &str, stage: ExecutionStatus, meta: EventMeta) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            stage,
            at: Utc::now(),
            meta,
        }
    }
}

/// Append failures are swallowed by implementations (logged, never
/// propagated): losing a breadcrumb must not fail an execution.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: LifecycleEvent);

    /// Events recorded for one execution, oldest first. Debugging surface.
    async fn list(&self, execution_id: &str) -> Vec<LifecycleEvent>;
}

pub type SharedEventLog = Arc<dyn EventLog>;
