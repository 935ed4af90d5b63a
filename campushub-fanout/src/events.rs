//! Events pushed to live sessions
//!
//! Everything a connected client can receive over its bidirectional
//! channel. The wire shape is tagged JSON, e.g.
//! `{"type": "communication_created", ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campushub_core::models::{
    CommunicationId, CommunicationKind, RecipientId, RoomId, Role, TenantId,
};

/// Events fanned out to live sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FanoutEvent {
    /// A new communication was dispatched to this tenant
    ///
    /// Carries the audience summary, not the resolved recipient list;
    /// durable delivery happens separately through the dispatch queue.
    CommunicationCreated {
        communication_id: CommunicationId,
        tenant_id: TenantId,
        title: String,
        kind: CommunicationKind,
        roles: Vec<Role>,
        audience_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// A message sent into a room by one of its members
    RoomMessage {
        tenant_id: TenantId,
        room_id: RoomId,
        sender_id: RecipientId,
        sender_name: String,
        body: String,
        timestamp: DateTime<Utc>,
    },

    /// Operator notice for all clients of a tenant
    SystemNotice {
        tenant_id: TenantId,
        message: String,
        level: NoticeLevel,
        timestamp: DateTime<Utc>,
    },
}

/// Severity of a system notice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl FanoutEvent {
    /// Event type tag (matches the serialized `type` field)
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CommunicationCreated { .. } => "communication_created",
            Self::RoomMessage { .. } => "room_message",
            Self::SystemNotice { .. } => "system_notice",
        }
    }

    /// Tenant the event belongs to
    #[must_use]
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            Self::CommunicationCreated { tenant_id, .. }
            | Self::RoomMessage { tenant_id, .. }
            | Self::SystemNotice { tenant_id, .. } => tenant_id,
        }
    }
}
