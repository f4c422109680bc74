use super::{EVENT_TTL_SECS, EventLog, LifecycleEvent, events_key};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Broker-backed event log: list append under `execution:<id>:events` with
/// the TTL refreshed on every write.
#[derive(Clone)]
pub struct RedisEventLog {
    conn: ConnectionManager,
}

impl RedisEventLog {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn try_append(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let key = events_key(&event.execution_id);
        let payload = serde_json::to_string(event)?;

        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&key, payload).await?;
        let _: () = conn.expire(&key, EVENT_TTL_SECS as i64).await?;
        Ok(())
    }

    async fn try_list(&self, execution_id: &str) -> anyhow::Result<Vec<LifecycleEvent>> {
        let key = events_key(execution_id);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;

        let mut events = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_str(&item) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("Skipping undecodable lifecycle event: {}", e),
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn append(&self, event: LifecycleEvent) {
        if let Err(e) = self.try_append(&event).await {
            tracing::warn!(
                execution_id = %event.execution_id,
                stage = event.stage.as_str(),
                "Failed to append lifecycle event: {}",
                e
            );
        }
    }

    async fn list(&self, execution_id: &str) -> Vec<LifecycleEvent> {
        match self.try_list(execution_id).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(execution_id, "Failed to read lifecycle events: {}", e);
                Vec::new()
            }
        }
    }
}
