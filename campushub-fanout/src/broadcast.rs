//! Realtime broadcaster
//!
//! Pushes events to every live session in a scope (tenant, room, or single
//! recipient). Best-effort and fire-and-forget: a session whose channel is
//! gone is treated as an implicit disconnect and pruned from the registry,
//! never retried. Durability is the dispatch queue's job, not this one's.

use tracing::{debug, warn};

use campushub_core::models::{RecipientId, RoomId, SessionId, TenantId};

use crate::events::FanoutEvent;
use crate::registry::{ConnectionRegistry, EventSender};

/// Best-effort fan-out over the connection registry
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster").finish()
    }
}

impl Broadcaster {
    #[must_use]
    pub const fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Push an event to every session of a tenant
    ///
    /// Returns the number of sessions the event was handed to. Zero is not
    /// an error — a tenant with nobody online simply misses the live push.
    pub fn push_to_tenant(&self, tenant_id: &TenantId, event: &FanoutEvent) -> usize {
        let room = RoomId::for_tenant(tenant_id);
        self.emit(self.registry.sessions_in_room(&room), event)
    }

    /// Push an event to every session in a room
    pub fn push_to_room(&self, room_id: &RoomId, event: &FanoutEvent) -> usize {
        self.emit(self.registry.sessions_in_room(room_id), event)
    }

    /// Push an event to every session of one recipient
    pub fn push_to_recipient(&self, recipient_id: &RecipientId, event: &FanoutEvent) -> usize {
        self.emit(self.registry.sessions_for(recipient_id), event)
    }

    fn emit(&self, targets: Vec<(SessionId, EventSender)>, event: &FanoutEvent) -> usize {
        let mut sent = 0usize;
        let mut dead = Vec::new();

        for (session_id, sender) in targets {
            match sender.send(event.clone()) {
                Ok(()) => sent += 1,
                Err(_) => {
                    // The receiving side is gone: implicit disconnect
                    warn!(
                        session_id = %session_id,
                        event_type = %event.event_type(),
                        "Session channel closed, pruning"
                    );
                    dead.push(session_id);
                }
            }
        }

        for session_id in dead {
            self.registry.disconnect(&session_id);
        }

        if sent > 0 {
            debug!(
                sent,
                event_type = %event.event_type(),
                "Broadcast complete"
            );
        }

        sent
    }
}
