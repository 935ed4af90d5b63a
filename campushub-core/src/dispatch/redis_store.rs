//! Redis-backed job store
//!
//! Multi-process backend: job records are JSON strings keyed by job id, and
//! eligibility is a sorted set scored by `next_eligible_at` millis. Claiming
//! is a Lua script that pops one eligible id and re-scores it to
//! `now + visibility_timeout`, so a worker that dies mid-delivery loses its
//! claim instead of wedging the job.
//!
//! Terminal records stay in Redis (outside the scheduled set) as the
//! append-only audit trail the operator surface reads.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use crate::models::{CommunicationId, DeliveryJob, JobId};
use crate::Result;

use super::job_store::JobStore;

/// Redis-backed [`JobStore`] for multi-process worker fleets
#[derive(Clone)]
pub struct RedisJobStore {
    client: Arc<redis::Client>,
    key_prefix: String,
    visibility_timeout: Duration,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("key_prefix", &self.key_prefix)
            .field("visibility_timeout", &self.visibility_timeout)
            .finish()
    }
}

impl RedisJobStore {
    #[must_use]
    pub fn new(
        client: Arc<redis::Client>,
        key_prefix: impl Into<String>,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            visibility_timeout,
        }
    }

    fn job_key_prefix(&self) -> String {
        format!("{}dispatch:job:", self.key_prefix)
    }

    fn job_key(&self, job_id: &JobId) -> String {
        format!("{}{}", self.job_key_prefix(), job_id.as_str())
    }

    fn scheduled_key(&self) -> String {
        format!("{}dispatch:scheduled", self.key_prefix)
    }

    fn communication_key(&self, communication_id: &CommunicationId) -> String {
        format!(
            "{}dispatch:comm:{}",
            self.key_prefix,
            communication_id.as_str()
        )
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, job: &DeliveryJob) -> Result<bool> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        // Atomically create the record, schedule it, and index it by
        // communication. Returns 0 without touching anything when the job
        // id already exists.
        let script = redis::Script::new(
            r"
            if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
            redis.call('SET', KEYS[1], ARGV[1])
            redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
            redis.call('SADD', KEYS[3], ARGV[3])
            return 1
            ",
        );

        let created: i64 = script
            .key(self.job_key(&job.job_id))
            .key(self.scheduled_key())
            .key(self.communication_key(&job.communication_id))
            .arg(payload)
            .arg(job.next_eligible_at.timestamp_millis())
            .arg(job.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        Ok(created == 1)
    }

    async fn claim_eligible(&self, now: DateTime<Utc>) -> Result<Option<DeliveryJob>> {
        let mut conn = self.connection().await?;

        // Pop one eligible id and push its score past the visibility
        // window so no other worker claims it concurrently. A scheduled id
        // whose record vanished is dropped from the set.
        let script = redis::Script::new(
            r"
            local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
            if #ids == 0 then return false end
            local id = ids[1]
            local job = redis.call('GET', KEYS[2] .. id)
            if not job then
                redis.call('ZREM', KEYS[1], id)
                return false
            end
            redis.call('ZADD', KEYS[1], ARGV[2], id)
            return job
            ",
        );

        let visibility_deadline = now
            + chrono::Duration::milliseconds(self.visibility_timeout.as_millis() as i64);

        let payload: Option<String> = script
            .key(self.scheduled_key())
            .key(self.job_key_prefix())
            .arg(now.timestamp_millis())
            .arg(visibility_deadline.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        match payload {
            Some(json) => {
                let job: DeliveryJob = serde_json::from_str(&json)?;
                debug!(job_id = %job.job_id, "Claimed delivery job from Redis");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn release(&self, job: &DeliveryJob) -> Result<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        let script = redis::Script::new(
            r"
            redis.call('SET', KEYS[1], ARGV[1])
            redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
            return 1
            ",
        );

        let _: i64 = script
            .key(self.job_key(&job.job_id))
            .key(self.scheduled_key())
            .arg(payload)
            .arg(job.next_eligible_at.timestamp_millis())
            .arg(job.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn complete(&self, job: &DeliveryJob) -> Result<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        let script = redis::Script::new(
            r"
            redis.call('SET', KEYS[1], ARGV[1])
            redis.call('ZREM', KEYS[2], ARGV[2])
            return 1
            ",
        );

        let _: i64 = script
            .key(self.job_key(&job.job_id))
            .key(self.scheduled_key())
            .arg(payload)
            .arg(job.job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn job(&self, job_id: &JobId) -> Result<Option<DeliveryJob>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(self.job_key(job_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn jobs_for_communication(
        &self,
        communication_id: &CommunicationId,
    ) -> Result<Vec<DeliveryJob>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .smembers(self.communication_key(communication_id))
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> =
                conn.get(self.job_key(&JobId::from_string(id))).await?;
            if let Some(json) = payload {
                jobs.push(serde_json::from_str(&json)?);
            }
        }
        Ok(jobs)
    }
}
