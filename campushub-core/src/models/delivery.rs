//! Delivery job models
//!
//! One job is one durable, retriable unit of asynchronous delivery work.
//! Jobs are created by the fan-out coordinator at enqueue time and mutated
//! only by dispatch queue workers; the job log is append-only — a failed
//! job is never resurrected, an operator retry mints a new id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{CommunicationId, JobId};

/// Terminal-state machine of one delivery job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker (or between retry attempts)
    Pending,
    /// Every target accepted the delivery
    Succeeded,
    /// Retry ceiling reached; only an explicit operator retry (with a new
    /// job id) can deliver this communication now
    FailedPermanent,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::FailedPermanent)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedPermanent => write!(f, "failed_permanent"),
        }
    }
}

/// A durable delivery task carried by the dispatch queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub job_id: JobId,
    pub communication_id: CommunicationId,
    /// Target contact addresses, in resolution order. Delivered as one
    /// unit for attempt counting; may legitimately be empty.
    pub targets: Vec<String>,
    pub attempts: u32,
    pub next_eligible_at: DateTime<Utc>,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryJob {
    #[must_use]
    pub fn new(job_id: JobId, communication_id: CommunicationId, targets: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            communication_id,
            targets,
            attempts: 0,
            next_eligible_at: now,
            status: JobStatus::Pending,
            last_error: None,
            created_at: now,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
