use super::{EVENT_TTL_SECS, EventLog, LifecycleEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct EventList {
    expires_at: Instant,
    events: Vec<LifecycleEvent>,
}

/// In-process event log for embedded deployments and tests. Keys expire a
/// fixed interval after their last append, mirroring the broker-backed TTL.
#[derive(Default)]
pub struct MemoryEventLog {
    entries: Mutex<HashMap<String, EventList>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for EventList {
    fn default() -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_secs(EVENT_TTL_SECS),
            events: Vec::new(),
        }
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: LifecycleEvent) {
        let mut entries = self.entries.lock().expect("event log lock poisoned");
        let now = Instant::now();
        entries.retain(|_, list| list.expires_at > now);

        let list = entries.entry(event.execution_id.clone()).or_default();
        list.expires_at = now + Duration::from_secs(EVENT_TTL_SECS);
        list.events.push(event);
    }

    async fn list(&self, execution_id: &str) -> Vec<LifecycleEvent> {
        let entries = self.entries.lock().expect("event log lock poisoned");
        match entries.get(execution_id) {
            Some(list) if list.expires_at > Instant::now() => list.events.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventMeta;
    use crate::models::ExecutionStatus;

    #[tokio::test]
    async fn appends_accumulate_in_order() {
        let log = MemoryEventLog::new();
        log.append(LifecycleEvent::now(
            "x",
            ExecutionStatus::Queued,
            EventMeta::default(),
        ))
        .await;
        log.append(LifecycleEvent::now(
            "x",
            ExecutionStatus::Running,
            EventMeta::default(),
        ))
        .await;

        let events = log.list("x").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, ExecutionStatus::Queued);
        assert_eq!(events[1].stage, ExecutionStatus::Running);
        assert!(log.list("other").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let log = MemoryEventLog::new();
        log.append(LifecycleEvent::now(
            "x",
            ExecutionStatus::Queued,
            EventMeta::default(),
        ))
        .await;

        tokio::time::advance(Duration::from_secs(EVENT_TTL_SECS + 1)).await;
        assert!(log.list("x").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn appends_refresh_the_ttl() {
        let log = MemoryEventLog::new();
        log.append(LifecycleEvent::now(
            "x",
            ExecutionStatus::Queued,
            EventMeta::default(),
        ))
        .await;

        tokio::time::advance(Duration::from_secs(EVENT_TTL_SECS - 10)).await;
        log.append(LifecycleEvent::now(
            "x",
            ExecutionStatus::Running,
            EventMeta::default(),
        ))
        .await;

        tokio::time::advance(Duration::from_secs(EVENT_TTL_SECS - 10)).await;
        assert_eq!(log.list("x").await.len(), 2);
    }
}
