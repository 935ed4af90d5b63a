//! Store collaborator
//!
//! The store is the durable record of communications and room messages.
//! The core reads communications to deliver them and appends room messages
//! before broadcasting; it never owns the records.

use async_trait::async_trait;

use crate::models::{Communication, CommunicationId, RecipientId, RoomId, TenantId};
use crate::Result;

/// Durable record of communications and their metadata
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a communication by id
    ///
    /// `Ok(None)` means the record does not exist; transport failures map
    /// to [`Error::Store`](crate::Error::Store).
    async fn communication(&self, id: &CommunicationId) -> Result<Option<Communication>>;

    /// Persist a room message before it is broadcast to the room
    async fn append_room_message(
        &self,
        tenant_id: &TenantId,
        room_id: &RoomId,
        sender_id: &RecipientId,
        body: &str,
    ) -> Result<()>;
}
