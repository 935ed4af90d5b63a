//! Dispatch queue
//!
//! The durable, asynchronous half of communication fan-out: jobs enqueued
//! here survive the request that created them and are drained by a worker
//! pool with bounded exponential retry. Delivery is at-least-once with
//! dedupe by job id — re-submitting an id that already has a record is a
//! no-op, which is what makes request retries safe.

pub mod backoff;
pub mod job_store;
pub mod memory;
pub mod redis_store;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DispatchConfig, RedisConfig};
use crate::models::{CommunicationId, DeliveryJob, JobId};
use crate::Result;

pub use backoff::backoff_delay;
pub use job_store::JobStore;
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use worker::{DeliveryWorker, WorkerPool};

/// Retry and scheduling policy for delivery jobs
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_min: Duration::from_secs(config.backoff_min_seconds),
            backoff_max: Duration::from_secs(config.backoff_max_seconds),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_seconds),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_seconds),
        }
    }
}

/// Build the job store the configuration calls for
///
/// Redis when a URL is configured (multi-process safe), otherwise the
/// in-memory store — single-process only, jobs do not survive a restart.
pub fn job_store_from_config(
    redis: &RedisConfig,
    policy: &DispatchPolicy,
) -> Result<Arc<dyn JobStore>> {
    match &redis.url {
        Some(url) => {
            let client = Arc::new(redis::Client::open(url.as_str())?);
            info!("Dispatch queue using Redis job store");
            Ok(Arc::new(RedisJobStore::new(
                client,
                redis.key_prefix.clone(),
                policy.visibility_timeout,
            )))
        }
        None => {
            warn!("No Redis configured, dispatch queue is in-memory (single-process only)");
            Ok(Arc::new(MemoryJobStore::new()))
        }
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// A new job record was created
    Accepted,
    /// A record for this job id already existed; nothing was changed
    Duplicate,
}

/// Enqueue facade over a [`JobStore`]
#[derive(Clone)]
pub struct DispatchQueue {
    jobs: Arc<dyn JobStore>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue").finish()
    }
}

impl DispatchQueue {
    #[must_use]
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Enqueue one delivery job
    ///
    /// The caller chooses the job id; submitting an id that already has a
    /// record (pending or terminal) changes nothing and reports
    /// [`Enqueued::Duplicate`]. The call returns as soon as the record is
    /// durable — actual delivery happens in the workers.
    pub async fn enqueue(
        &self,
        job_id: JobId,
        communication_id: CommunicationId,
        targets: Vec<String>,
    ) -> Result<Enqueued> {
        let job = DeliveryJob::new(job_id, communication_id, targets);

        if self.jobs.insert(&job).await? {
            info!(
                job_id = %job.job_id,
                communication_id = %job.communication_id,
                targets = job.targets.len(),
                "Delivery job enqueued"
            );
            Ok(Enqueued::Accepted)
        } else {
            debug!(
                job_id = %job.job_id,
                communication_id = %job.communication_id,
                "Duplicate enqueue ignored"
            );
            Ok(Enqueued::Duplicate)
        }
    }

    /// Fetch one job by id
    pub async fn job(&self, job_id: &JobId) -> Result<Option<DeliveryJob>> {
        self.jobs.job(job_id).await
    }

    /// The most recently created job for a communication, if any
    ///
    /// Operator retries mint new jobs, so the latest record is the one the
    /// status surface reports; older jobs remain as the audit trail.
    pub async fn status_for_communication(
        &self,
        communication_id: &CommunicationId,
    ) -> Result<Option<DeliveryJob>> {
        let mut jobs = self.jobs.jobs_for_communication(communication_id).await?;
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_dedupes_by_job_id() {
        let queue = DispatchQueue::new(Arc::new(MemoryJobStore::new()));
        let comm = CommunicationId::new();
        let job_id = JobId::for_delivery(&comm);

        let first = queue
            .enqueue(job_id.clone(), comm.clone(), vec!["a@example.com".to_string()])
            .await
            .unwrap();
        let second = queue
            .enqueue(job_id.clone(), comm.clone(), vec!["a@example.com".to_string()])
            .await
            .unwrap();

        assert_eq!(first, Enqueued::Accepted);
        assert_eq!(second, Enqueued::Duplicate);

        let job = queue.job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_status_reports_latest_job() {
        let queue = DispatchQueue::new(Arc::new(MemoryJobStore::new()));
        let comm = CommunicationId::new();

        queue
            .enqueue(JobId::for_delivery(&comm), comm.clone(), vec![])
            .await
            .unwrap();

        // A later operator retry supersedes the original in the status view
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let retry_id = JobId::for_retry(&comm);
        queue
            .enqueue(retry_id.clone(), comm.clone(), vec![])
            .await
            .unwrap();

        let latest = queue.status_for_communication(&comm).await.unwrap().unwrap();
        assert_eq!(latest.job_id, retry_id);
    }

    #[test]
    fn test_policy_from_config() {
        let config = DispatchConfig::default();
        let policy = DispatchPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_min, Duration::from_secs(10));
        assert_eq!(policy.backoff_max, Duration::from_secs(600));
    }
}
