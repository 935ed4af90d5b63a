//! Communication models
//!
//! A communication is the unit of fan-out: a titled message a sender
//! addresses to a logical audience within one tenant. The Store owns the
//! durable record; the core reads it to resolve and deliver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{CommunicationId, RecipientId, TenantId};
use crate::models::recipient::Role;

/// Communication type tag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationKind {
    /// General announcement
    Announcement,
    /// Calendar or school event
    Event,
    /// Fee payment reminder
    FeeReminder,
    /// Urgent, tenant-wide alert
    Emergency,
}

impl std::fmt::Display for CommunicationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Announcement => write!(f, "announcement"),
            Self::Event => write!(f, "event"),
            Self::FeeReminder => write!(f, "fee_reminder"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

impl std::str::FromStr for CommunicationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announcement" => Ok(Self::Announcement),
            "event" => Ok(Self::Event),
            "fee_reminder" => Ok(Self::FeeReminder),
            "emergency" => Ok(Self::Emergency),
            _ => Err(anyhow::anyhow!("Invalid communication kind: {s}")),
        }
    }
}

/// The logical audience attached to a communication before resolution
///
/// Ordered set of role tags and/or explicit recipient ids, always scoped
/// to the communication's tenant. An empty spec is legitimate (a draft
/// targeting nobody yet).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudienceSpec {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub recipients: Vec<RecipientId>,
}

impl AudienceSpec {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.recipients.is_empty()
    }
}

/// A communication record, as read from the Store
///
/// Immutable once dispatch has begun; administrative edits upstream do not
/// re-trigger delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub id: CommunicationId,
    pub tenant_id: TenantId,
    pub sender_id: RecipientId,
    pub title: String,
    pub body: String,
    pub kind: CommunicationKind,
    pub audience: AudienceSpec,
    pub created_at: DateTime<Utc>,
}

impl Communication {
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        sender_id: RecipientId,
        title: String,
        body: String,
        kind: CommunicationKind,
        audience: AudienceSpec,
    ) -> Self {
        Self {
            id: CommunicationId::new(),
            tenant_id,
            sender_id,
            title,
            body,
            kind,
            audience,
            created_at: Utc::now(),
        }
    }

    /// Subject line used for email delivery
    #[must_use]
    pub fn email_subject(&self) -> String {
        format!("[{}] {}", self.kind, self.title)
    }
}
