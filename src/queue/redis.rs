use super::{
    DeadJob, EnqueueOptions, Job, JobQueue, QueueError, RunJob, backoff_delay_ms,
};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const KEY_READY: &str = "runbox:queue:ready";
const KEY_DELAYED: &str = "runbox:queue:delayed";
const KEY_RESERVED: &str = "runbox:queue:reserved";
const KEY_DEAD: &str = "runbox:queue:dead";

fn job_key(id: &str) -> String {
    format!("runbox:queue:job:{id}")
}

/// Broker-backed queue for multi-process deployments.
///
/// Layout: ready list (FIFO), delayed and reserved sorted sets scored by due
/// epoch-millis, one hash per job, and a dead hash retaining exhausted jobs.
/// Promotion claims ids via ZREM so concurrent workers cannot double-promote;
/// LPOP makes handout itself atomic.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    visibility_timeout_ms: i64,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, visibility_timeout: std::time::Duration) -> Self {
        Self {
            conn,
            visibility_timeout_ms: visibility_timeout.as_millis() as i64,
        }
    }

    async fn promote_due(
        &self,
        conn: &mut ConnectionManager,
        set_key: &str,
        now_ms: i64,
    ) -> Result<(), QueueError> {
        let due: Vec<String> = conn.zrangebyscore(set_key, i64::MIN, now_ms).await?;
        for id in due {
            let claimed: i64 = conn.zrem(set_key, &id).await?;
            if claimed == 1 {
                let _: () = conn.rpush(KEY_READY, &id).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, payload: RunJob, options: EnqueueOptions) -> Result<(), QueueError> {
        let id = payload.execution_id.clone();
        let key = job_key(&id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await?;
        if exists {
            return Err(QueueError::DuplicateJob(id));
        }

        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("payload", serde_json::to_string(&payload)?),
                    ("attempts_made", "0".to_string()),
                    ("max_attempts", options.attempts.max(1).to_string()),
                    (
                        "backoff_initial_ms",
                        options.backoff_initial_ms.to_string(),
                    ),
                ],
            )
            .await?;
        let _: () = conn.rpush(KEY_READY, &id).await?;
        Ok(())
    }

    async fn reserve(&self, _worker_id: &str) -> Result<Option<Job>, QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        self.promote_due(&mut conn, KEY_DELAYED, now_ms).await?;
        self.promote_due(&mut conn, KEY_RESERVED, now_ms).await?;

        loop {
            let id: Option<String> = conn.lpop(KEY_READY, None).await?;
            let Some(id) = id else {
                return Ok(None);
            };

            let fields: std::collections::HashMap<String, String> =
                conn.hgetall(job_key(&id)).await?;
            if fields.is_empty() {
                // Job was acked while its id sat in the ready list.
                continue;
            }

            let payload: RunJob = serde_json::from_str(
                fields.get("payload").map(String::as_str).unwrap_or("{}"),
            )?;
            let attempts_made = fields
                .get("attempts_made")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let max_attempts = fields
                .get("max_attempts")
                .and_then(|v| v.parse().ok())
                .unwrap_or(super::DEFAULT_ATTEMPTS);

            let _: () = conn
                .zadd(KEY_RESERVED, &id, now_ms + self.visibility_timeout_ms)
                .await?;

            return Ok(Some(Job {
                id,
                payload,
                attempts_made,
                max_attempts,
            }));
        }
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(KEY_RESERVED, &job.id).await?;
        let _: () = conn.del(job_key(&job.id)).await?;
        Ok(())
    }

    async fn nack(&self, job: &Job, error: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let key = job_key(&job.id);

        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(QueueError::UnknownJob(job.id.clone()));
        }

        let _: () = conn.zrem(KEY_RESERVED, &job.id).await?;
        let attempts_made: i64 = conn.hincr(&key, "attempts_made", 1).await?;
        let backoff_initial_ms: u64 = conn
            .hget::<_, _, Option<String>>(&key, "backoff_initial_ms")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(super::DEFAULT_BACKOFF_INITIAL_MS);
        let max_attempts: i64 = conn
            .hget::<_, _, Option<String>>(&key, "max_attempts")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(super::DEFAULT_ATTEMPTS as i64);

        if attempts_made >= max_attempts {
            let dead = DeadJob {
                id: job.id.clone(),
                payload: job.payload.clone(),
                attempts_made: attempts_made as u32,
                error: error.to_string(),
            };
            let _: () = conn
                .hset(KEY_DEAD, &job.id, serde_json::to_string(&dead)?)
                .await?;
        } else {
            let delay = backoff_delay_ms(backoff_initial_ms, (attempts_made - 1) as u32);
            let due = Utc::now().timestamp_millis() + delay as i64;
            let _: () = conn.zadd(KEY_DELAYED, &job.id, due).await?;
        }
        Ok(())
    }

    async fn dead_jobs(&self) -> Result<Vec<DeadJob>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: std::collections::HashMap<String, String> = conn.hgetall(KEY_DEAD).await?;

        let mut dead = Vec::with_capacity(raw.len());
        for (id, value) in raw {
            match serde_json::from_str(&value) {
                Ok(job) => dead.push(job),
                Err(e) => tracing::warn!(job_id = %id, "Undecodable dead job: {}", e),
            }
        }
        dead.sort_by(|a: &DeadJob, b: &DeadJob| a.id.cmp(&b.id));
        Ok(dead)
    }
}
