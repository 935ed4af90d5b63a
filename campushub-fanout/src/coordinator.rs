//! Fan-out coordinator
//!
//! Orchestrates a communication's fan-out: resolve the audience once, hand
//! the live push to the broadcaster, and enqueue the durable delivery job.
//! The creating request gets its answer as soon as the job is accepted;
//! eventual delivery outcomes are visible only through the operator
//! surface (`dispatch_status` / `retry_delivery`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use campushub_core::dispatch::{DispatchQueue, Enqueued};
use campushub_core::models::{
    Communication, CommunicationId, JobId, JobStatus,
};
use campushub_core::service::AudienceResolver;
use campushub_core::store::Store;
use campushub_core::{Error, Result};

use crate::broadcast::Broadcaster;
use crate::events::FanoutEvent;

/// What `dispatch()` accomplished
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub communication_id: CommunicationId,
    pub job_id: JobId,
    pub audience_size: usize,
    /// Sessions the live push reached (zero is fine)
    pub live_sessions_notified: usize,
    /// The delivery job already existed; this was a request retry
    pub duplicate: bool,
}

/// Operator view of a communication's delivery
#[derive(Debug, Clone)]
pub struct DispatchStatus {
    pub job_id: JobId,
    pub status: JobStatus,
    pub attempts: u32,
    pub next_eligible_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Orchestrates resolver, broadcaster, and dispatch queue
#[derive(Clone)]
pub struct FanoutCoordinator {
    resolver: AudienceResolver,
    broadcaster: Broadcaster,
    queue: DispatchQueue,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for FanoutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutCoordinator").finish()
    }
}

impl FanoutCoordinator {
    #[must_use]
    pub fn new(
        resolver: AudienceResolver,
        broadcaster: Broadcaster,
        queue: DispatchQueue,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            resolver,
            broadcaster,
            queue,
            store,
        }
    }

    /// Fan out a freshly created communication
    ///
    /// Resolution failure aborts the whole call — nothing is broadcast and
    /// nothing is enqueued. The live push is best-effort; the call returns
    /// once the delivery job is durably accepted, without waiting for any
    /// actual delivery.
    pub async fn dispatch(&self, communication: &Communication) -> Result<DispatchOutcome> {
        let audience = self
            .resolver
            .resolve(&communication.tenant_id, &communication.audience)
            .await?;

        let event = FanoutEvent::CommunicationCreated {
            communication_id: communication.id.clone(),
            tenant_id: communication.tenant_id.clone(),
            title: communication.title.clone(),
            kind: communication.kind,
            roles: communication.audience.roles.clone(),
            audience_size: audience.len(),
            timestamp: Utc::now(),
        };
        let live_sessions_notified =
            self.broadcaster.push_to_tenant(&communication.tenant_id, &event);

        // Deterministic job id: a duplicate "create" request cannot
        // double-enqueue.
        let job_id = JobId::for_delivery(&communication.id);
        let enqueued = self
            .queue
            .enqueue(
                job_id.clone(),
                communication.id.clone(),
                audience.addresses(),
            )
            .await?;
        let duplicate = enqueued == Enqueued::Duplicate;

        info!(
            communication_id = %communication.id,
            tenant_id = %communication.tenant_id.as_str(),
            job_id = %job_id,
            audience_size = audience.len(),
            live_sessions_notified,
            duplicate,
            "Communication dispatched"
        );

        Ok(DispatchOutcome {
            communication_id: communication.id.clone(),
            job_id,
            audience_size: audience.len(),
            live_sessions_notified,
            duplicate,
        })
    }

    /// Operator retry of a communication's delivery
    ///
    /// Mints a brand-new job id and re-resolves the audience fresh, so
    /// membership changes since the original failure are included. The old
    /// job is left untouched as history.
    pub async fn retry_delivery(&self, communication_id: &CommunicationId) -> Result<JobId> {
        let communication = self
            .store
            .communication(communication_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Communication {communication_id} not found"))
            })?;

        let audience = self
            .resolver
            .resolve(&communication.tenant_id, &communication.audience)
            .await?;

        let job_id = JobId::for_retry(communication_id);
        let enqueued = self
            .queue
            .enqueue(
                job_id.clone(),
                communication_id.clone(),
                audience.addresses(),
            )
            .await?;
        if enqueued == Enqueued::Duplicate {
            warn!(job_id = %job_id, "Fresh retry job id collided with an existing record");
        }

        info!(
            communication_id = %communication_id,
            job_id = %job_id,
            audience_size = audience.len(),
            "Delivery retry enqueued"
        );

        Ok(job_id)
    }

    /// Delivery status of a communication, from its most recent job
    pub async fn dispatch_status(
        &self,
        communication_id: &CommunicationId,
    ) -> Result<DispatchStatus> {
        let job = self
            .queue
            .status_for_communication(communication_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "No delivery job for communication {communication_id}"
                ))
            })?;

        Ok(DispatchStatus {
            job_id: job.job_id,
            status: job.status,
            attempts: job.attempts,
            next_eligible_at: job.next_eligible_at,
            last_error: job.last_error,
        })
    }
}
