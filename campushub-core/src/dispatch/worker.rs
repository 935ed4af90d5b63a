//! Delivery workers
//!
//! Workers drain the job store: claim one eligible job, load its
//! communication from the Store, push it to every target through the
//! delivery channel, and either complete the job or schedule a retry.
//! The whole job is retried as a unit — at-least-once, not exactly-once.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::DeliveryChannel;
use crate::logging::mask_email;
use crate::models::{DeliveryJob, JobStatus};
use crate::store::Store;
use crate::{Error, Result};

use super::backoff::backoff_delay;
use super::job_store::JobStore;
use super::DispatchPolicy;

/// One delivery worker
///
/// Cheap to clone; a [`WorkerPool`] runs several clones concurrently
/// against the same job store.
#[derive(Clone)]
pub struct DeliveryWorker {
    jobs: Arc<dyn JobStore>,
    store: Arc<dyn Store>,
    channel: Arc<dyn DeliveryChannel>,
    policy: DispatchPolicy,
}

impl std::fmt::Debug for DeliveryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryWorker")
            .field("policy", &self.policy)
            .finish()
    }
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        store: Arc<dyn Store>,
        channel: Arc<dyn DeliveryChannel>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            jobs,
            store,
            channel,
            policy,
        }
    }

    /// Run until the shutdown signal flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.jobs.claim_eligible(Utc::now()).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => {
                    if !self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "Failed to poll job store");
                    if !self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }
        info!("Delivery worker stopped");
    }

    /// Wait out the poll interval, waking early on shutdown
    ///
    /// Returns `false` when the shutdown side is gone and the worker
    /// should stop.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.policy.poll_interval) => true,
            changed = shutdown.changed() => changed.is_ok(),
        }
    }

    /// Process one claimed job to a release or a terminal state
    async fn process(&self, mut job: DeliveryJob) {
        // Claimed records should always be pending; a terminal one is the
        // dedupe guard against double execution after a store hiccup.
        if job.is_terminal() {
            debug!(job_id = %job.job_id, status = %job.status, "Skipping terminal job");
            if let Err(err) = self.jobs.complete(&job).await {
                error!(job_id = %job.job_id, error = %err, "Failed to settle terminal job");
            }
            return;
        }

        job.attempts += 1;

        let outcome = match tokio::time::timeout(
            self.policy.attempt_timeout,
            self.attempt(&job),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::DeliveryAttemptFailed(format!(
                "Attempt timed out after {:?}",
                self.policy.attempt_timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                job.status = JobStatus::Succeeded;
                job.last_error = None;
                if let Err(err) = self.jobs.complete(&job).await {
                    error!(job_id = %job.job_id, error = %err, "Failed to record job success");
                    return;
                }
                info!(
                    job_id = %job.job_id,
                    communication_id = %job.communication_id,
                    attempts = job.attempts,
                    targets = job.targets.len(),
                    "Delivery job succeeded"
                );
            }
            Err(err) => self.handle_failure(job, &err).await,
        }
    }

    async fn handle_failure(&self, mut job: DeliveryJob, err: &Error) {
        job.last_error = Some(err.to_string());

        if err.is_retriable() && job.attempts < self.policy.max_attempts {
            let delay = backoff_delay(
                self.policy.backoff_min,
                self.policy.backoff_max,
                job.attempts,
            );
            job.next_eligible_at = Utc::now()
                + chrono::Duration::milliseconds(delay.as_millis() as i64);
            warn!(
                job_id = %job.job_id,
                communication_id = %job.communication_id,
                attempts = job.attempts,
                retry_in = ?delay,
                error = %err,
                "Delivery attempt failed, retry scheduled"
            );
            if let Err(store_err) = self.jobs.release(&job).await {
                error!(job_id = %job.job_id, error = %store_err, "Failed to reschedule job");
            }
        } else {
            job.status = JobStatus::FailedPermanent;
            // Surfaced for operator inspection via dispatch_status / logs;
            // never auto-retried again.
            error!(
                job_id = %job.job_id,
                communication_id = %job.communication_id,
                attempts = job.attempts,
                error = %err,
                "Delivery job permanently failed"
            );
            if let Err(store_err) = self.jobs.complete(&job).await {
                error!(job_id = %job.job_id, error = %store_err, "Failed to record permanent failure");
            }
        }
    }

    /// One delivery attempt across all of the job's targets
    async fn attempt(&self, job: &DeliveryJob) -> Result<()> {
        let communication = self
            .store
            .communication(&job.communication_id)
            .await?
            .ok_or_else(|| {
                // The record is gone; retrying cannot bring it back.
                Error::NotFound(format!(
                    "Communication {} not found",
                    job.communication_id
                ))
            })?;

        let subject = communication.email_subject();
        let mut failed = 0usize;

        for address in &job.targets {
            if let Err(err) = self
                .channel
                .send(address, &subject, &communication.body)
                .await
            {
                warn!(
                    job_id = %job.job_id,
                    address = %mask_email(address),
                    error = %err,
                    "Send failed for target"
                );
                failed += 1;
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(Error::DeliveryAttemptFailed(format!(
                "{failed}/{} targets failed",
                job.targets.len()
            )))
        }
    }
}

/// Pool of delivery workers with shared shutdown
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers onto the current runtime
    #[must_use]
    pub fn spawn(worker: DeliveryWorker, count: usize) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let handles = (0..count)
            .map(|_| {
                let worker = worker.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { worker.run(receiver).await })
            })
            .collect();
        info!(count, "Delivery worker pool started");
        Self { shutdown, handles }
    }

    /// Signal shutdown and wait for every worker to finish its current job
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Delivery worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.len())
            .finish()
    }
}
