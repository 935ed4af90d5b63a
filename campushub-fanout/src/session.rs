//! Transport session gateway
//!
//! The seam between the connection layer (websocket, gRPC stream — not
//! this crate's concern) and the fan-out core. Authentication happens
//! upstream; by the time `on_connect` runs, the caller holds a verified
//! [`RecipientIdentity`].
//!
//! Client messages into a room are persisted through the Store first and
//! broadcast to the room's sessions after, so a crash between the two
//! loses the push but never the record.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use campushub_core::models::{RecipientIdentity, RoomId, SessionId};
use campushub_core::store::Store;
use campushub_core::{Error, Result};

use crate::broadcast::Broadcaster;
use crate::events::FanoutEvent;
use crate::registry::ConnectionRegistry;

const MAX_MESSAGE_LEN: usize = 2000;

/// Gateway for transport connect/disconnect/message events
#[derive(Clone)]
pub struct SessionGateway {
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for SessionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGateway").finish()
    }
}

impl SessionGateway {
    #[must_use]
    pub fn new(
        registry: ConnectionRegistry,
        broadcaster: Broadcaster,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            store,
        }
    }

    /// Register a session for an authenticated recipient
    pub fn on_connect(
        &self,
        identity: &RecipientIdentity,
    ) -> Result<(SessionId, mpsc::UnboundedReceiver<FanoutEvent>)> {
        self.registry.connect(
            identity.id.clone(),
            identity.tenant_id.clone(),
            identity.display_name.clone(),
        )
    }

    /// Tear down a session
    pub fn on_disconnect(&self, session_id: &SessionId) {
        self.registry.disconnect(session_id);
    }

    /// Enroll a session in a room
    pub fn join_room(&self, session_id: &SessionId, room_id: RoomId) -> Result<()> {
        self.registry.join_room(session_id, room_id)
    }

    /// Handle a message a client sent into a room
    ///
    /// Persists the message, then forwards it to the room's sessions.
    /// Returns the number of sessions the push reached.
    pub async fn on_client_message(
        &self,
        session_id: &SessionId,
        room_id: &RoomId,
        body: &str,
    ) -> Result<usize> {
        if body.is_empty() {
            return Err(Error::InvalidInput(
                "Message body cannot be empty".to_string(),
            ));
        }
        if body.len() > MAX_MESSAGE_LEN {
            return Err(Error::InvalidInput(format!(
                "Message body must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }

        let info = self
            .registry
            .session_info(session_id)
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;

        if !self.registry.is_in_room(session_id, room_id) {
            return Err(Error::InvalidInput(
                "Session has not joined this room".to_string(),
            ));
        }

        self.store
            .append_room_message(&info.tenant_id, room_id, &info.recipient_id, body)
            .await?;

        let event = FanoutEvent::RoomMessage {
            tenant_id: info.tenant_id,
            room_id: room_id.clone(),
            sender_id: info.recipient_id.clone(),
            sender_name: info.display_name,
            body: body.to_string(),
            timestamp: Utc::now(),
        };

        let sent = self.broadcaster.push_to_room(room_id, &event);

        debug!(
            session_id = %session_id,
            room_id = %room_id.as_str(),
            sender_id = %info.recipient_id.as_str(),
            sent,
            "Room message forwarded"
        );

        Ok(sent)
    }
}
