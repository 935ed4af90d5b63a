//! In-memory job store
//!
//! Single-process backend used when Redis is not configured, and by the
//! test suite. All mutation goes through one mutex; claimed jobs are held
//! in an in-flight set so no two workers process the same job.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::{CommunicationId, DeliveryJob, JobId, JobStatus};
use crate::Result;

use super::job_store::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, DeliveryJob>,
    in_flight: HashSet<JobId>,
    by_communication: HashMap<CommunicationId, Vec<JobId>>,
}

/// In-memory [`JobStore`] (single-process only)
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records held (any status)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }
}

impl std::fmt::Debug for MemoryJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryJobStore")
            .field("jobs", &self.len())
            .finish()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &DeliveryJob) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.job_id) {
            return Ok(false);
        }
        inner
            .by_communication
            .entry(job.communication_id.clone())
            .or_default()
            .push(job.job_id.clone());
        inner.jobs.insert(job.job_id.clone(), job.clone());
        Ok(true)
    }

    async fn claim_eligible(&self, now: DateTime<Utc>) -> Result<Option<DeliveryJob>> {
        let mut inner = self.inner.lock();

        // Earliest-eligible pending job not already claimed
        let candidate = inner
            .jobs
            .values()
            .filter(|job| {
                job.status == JobStatus::Pending
                    && job.next_eligible_at <= now
                    && !inner.in_flight.contains(&job.job_id)
            })
            .min_by_key(|job| job.next_eligible_at)
            .cloned();

        if let Some(job) = &candidate {
            inner.in_flight.insert(job.job_id.clone());
        }
        Ok(candidate)
    }

    async fn release(&self, job: &DeliveryJob) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&job.job_id);
        inner.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn complete(&self, job: &DeliveryJob) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(&job.job_id);
        inner.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn job(&self, job_id: &JobId) -> Result<Option<DeliveryJob>> {
        Ok(self.inner.lock().jobs.get(job_id).cloned())
    }

    async fn jobs_for_communication(
        &self,
        communication_id: &CommunicationId,
    ) -> Result<Vec<DeliveryJob>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_communication
            .get(communication_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.jobs.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
