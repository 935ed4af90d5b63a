//! Job store abstraction
//!
//! The durable backend of the dispatch queue. Two implementations exist:
//! [`MemoryJobStore`](super::MemoryJobStore) for single-process
//! deployments and tests, and [`RedisJobStore`](super::RedisJobStore) for
//! multi-process worker fleets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CommunicationId, DeliveryJob, JobId};
use crate::Result;

/// Durable record of delivery jobs with atomic claim semantics
///
/// `insert` has create-if-absent semantics and is the queue's idempotency
/// boundary. `claim_eligible` hands one pending, eligible job to exactly
/// one caller at a time; a claimed job stays invisible to other callers
/// until it is `release`d (retry scheduled) or `complete`d (terminal).
/// Terminal records are kept for status queries and audit, never deleted.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job unless one with the same id already exists
    ///
    /// Returns `false` (and changes nothing) on a duplicate id.
    async fn insert(&self, job: &DeliveryJob) -> Result<bool>;

    /// Atomically claim one pending job with `next_eligible_at <= now`
    async fn claim_eligible(&self, now: DateTime<Utc>) -> Result<Option<DeliveryJob>>;

    /// Put a claimed job back in the queue with its updated attempt
    /// counter and `next_eligible_at`
    async fn release(&self, job: &DeliveryJob) -> Result<()>;

    /// Record a claimed job's terminal state
    async fn complete(&self, job: &DeliveryJob) -> Result<()>;

    /// Fetch a job by id
    async fn job(&self, job_id: &JobId) -> Result<Option<DeliveryJob>>;

    /// All jobs ever enqueued for a communication (original + retries)
    async fn jobs_for_communication(
        &self,
        communication_id: &CommunicationId,
    ) -> Result<Vec<DeliveryJob>>;
}
