//! Connection registry
//!
//! Tracks which recipients currently hold live sessions, grouped by tenant
//! and by room. Pure in-memory state with an explicit lifecycle: created at
//! process start, `shutdown()` on teardown. Three indices — session id,
//! recipient id, room id — are kept consistent by the single
//! connect/disconnect/join mutation path; each session entry carries its
//! own room set, so a disconnect touches exactly the rooms the session
//! joined rather than scanning every room.
//!
//! No registry operation performs network I/O.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use campushub_core::models::{RecipientId, RoomId, SessionId, TenantId};
use campushub_core::{Error, Result};

use crate::events::FanoutEvent;

/// Outbound channel of one session
pub type EventSender = mpsc::UnboundedSender<FanoutEvent>;

/// Read-only view of one registered session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub recipient_id: RecipientId,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub connected_at: Instant,
    pub rooms: HashSet<RoomId>,
}

impl SessionInfo {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Owning entry for one session
struct SessionEntry {
    info: SessionInfo,
    sender: EventSender,
}

/// Connection limits configuration
#[derive(Debug, Clone)]
pub struct RegistryLimits {
    /// Maximum concurrent sessions per recipient (devices/tabs)
    pub max_per_recipient: usize,

    /// Maximum sessions per room
    pub max_per_room: usize,

    /// Maximum total sessions
    pub max_total: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_per_recipient: 16,
            max_per_room: 500,
            max_total: 10_000,
        }
    }
}

/// Registry of live sessions, indexed by session, recipient, and room
#[derive(Clone)]
pub struct ConnectionRegistry {
    /// All live sessions by session id
    sessions: Arc<DashMap<SessionId, SessionEntry>>,

    /// Session ids by recipient id
    recipient_sessions: Arc<DashMap<RecipientId, HashSet<SessionId>>>,

    /// Session ids by room id
    room_sessions: Arc<DashMap<RoomId, HashSet<SessionId>>>,

    limits: Arc<RegistryLimits>,

    /// Lifetime count of sessions ever registered
    total_sessions: Arc<AtomicU64>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("sessions", &self.sessions.len())
            .field("recipients", &self.recipient_sessions.len())
            .field("rooms", &self.room_sessions.len())
            .finish()
    }
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            recipient_sessions: Arc::new(DashMap::new()),
            room_sessions: Arc::new(DashMap::new()),
            limits: Arc::new(limits),
            total_sessions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new session for a recipient
    ///
    /// The session is always enrolled in the tenant-wide room. Returns the
    /// session handle and the receiving end of its event channel.
    pub fn connect(
        &self,
        recipient_id: RecipientId,
        tenant_id: TenantId,
        display_name: String,
    ) -> Result<(SessionId, mpsc::UnboundedReceiver<FanoutEvent>)> {
        if self.sessions.len() >= self.limits.max_total {
            return Err(Error::RegistryAtCapacity(format!(
                "Server at capacity ({} sessions)",
                self.limits.max_total
            )));
        }

        if let Some(existing) = self.recipient_sessions.get(&recipient_id) {
            if existing.len() >= self.limits.max_per_recipient {
                return Err(Error::RegistryAtCapacity(format!(
                    "Too many sessions for this recipient (max {})",
                    self.limits.max_per_recipient
                )));
            }
        }

        let session_id = SessionId::new();
        let tenant_room = RoomId::for_tenant(&tenant_id);
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut rooms = HashSet::new();
        rooms.insert(tenant_room.clone());

        let entry = SessionEntry {
            info: SessionInfo {
                session_id: session_id.clone(),
                recipient_id: recipient_id.clone(),
                tenant_id: tenant_id.clone(),
                display_name,
                connected_at: Instant::now(),
                rooms,
            },
            sender,
        };

        self.sessions.insert(session_id.clone(), entry);
        self.recipient_sessions
            .entry(recipient_id.clone())
            .or_default()
            .insert(session_id.clone());
        self.room_sessions
            .entry(tenant_room)
            .or_default()
            .insert(session_id.clone());

        self.total_sessions.fetch_add(1, Ordering::Relaxed);

        info!(
            session_id = %session_id,
            recipient_id = %recipient_id.as_str(),
            tenant_id = %tenant_id.as_str(),
            live_sessions = self.sessions.len(),
            "Session connected"
        );

        Ok((session_id, receiver))
    }

    /// Remove a session from every index
    ///
    /// A recipient's entry disappears exactly when its last session does;
    /// other still-live sessions of the same recipient are untouched.
    pub fn disconnect(&self, session_id: &SessionId) {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            warn!(session_id = %session_id, "Disconnect for unknown session");
            return;
        };

        let info = entry.info;

        if let Some(mut recipient_sessions) =
            self.recipient_sessions.get_mut(&info.recipient_id)
        {
            recipient_sessions.remove(session_id);
            if recipient_sessions.is_empty() {
                drop(recipient_sessions);
                self.recipient_sessions.remove(&info.recipient_id);
            }
        }

        // Only the rooms this session joined, via its own back-index
        for room_id in &info.rooms {
            if let Some(mut room_sessions) = self.room_sessions.get_mut(room_id) {
                room_sessions.remove(session_id);
                if room_sessions.is_empty() {
                    drop(room_sessions);
                    self.room_sessions.remove(room_id);
                }
            }
        }

        info!(
            session_id = %session_id,
            recipient_id = %info.recipient_id.as_str(),
            duration = ?info.connected_at.elapsed(),
            "Session disconnected"
        );
    }

    /// Enroll a session in a room
    ///
    /// There is no explicit leave; room membership dies with the session.
    pub fn join_room(&self, session_id: &SessionId, room_id: RoomId) -> Result<()> {
        if let Some(room_sessions) = self.room_sessions.get(&room_id) {
            if room_sessions.len() >= self.limits.max_per_room {
                return Err(Error::RegistryAtCapacity(format!(
                    "Room at capacity ({} sessions)",
                    self.limits.max_per_room
                )));
            }
        }

        {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
            if !entry.info.rooms.insert(room_id.clone()) {
                // Already a member
                return Ok(());
            }
        }

        self.room_sessions
            .entry(room_id.clone())
            .or_default()
            .insert(session_id.clone());

        debug!(
            session_id = %session_id,
            room_id = %room_id.as_str(),
            "Session joined room"
        );

        Ok(())
    }

    /// Senders of all live sessions of one recipient
    #[must_use]
    pub fn sessions_for(&self, recipient_id: &RecipientId) -> Vec<(SessionId, EventSender)> {
        self.recipient_sessions
            .get(recipient_id)
            .map(|ids| self.collect_senders(&ids))
            .unwrap_or_default()
    }

    /// Senders of all sessions currently in a room
    #[must_use]
    pub fn sessions_in_room(&self, room_id: &RoomId) -> Vec<(SessionId, EventSender)> {
        self.room_sessions
            .get(room_id)
            .map(|ids| self.collect_senders(&ids))
            .unwrap_or_default()
    }

    fn collect_senders(&self, ids: &HashSet<SessionId>) -> Vec<(SessionId, EventSender)> {
        ids.iter()
            .filter_map(|id| {
                self.sessions
                    .get(id)
                    .map(|entry| (id.clone(), entry.sender.clone()))
            })
            .collect()
    }

    /// Read-only view of one session
    #[must_use]
    pub fn session_info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|entry| entry.info.clone())
    }

    /// Whether a session has joined a room
    #[must_use]
    pub fn is_in_room(&self, session_id: &SessionId, room_id: &RoomId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| entry.info.rooms.contains(room_id))
    }

    /// Number of live sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of live sessions of one recipient
    #[must_use]
    pub fn session_count_for(&self, recipient_id: &RecipientId) -> usize {
        self.recipient_sessions
            .get(recipient_id)
            .map_or(0, |ids| ids.len())
    }

    /// Number of recipients with at least one live session
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.recipient_sessions.len()
    }

    /// Number of rooms with at least one session
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.room_sessions.len()
    }

    /// Lifetime count of sessions ever registered
    #[must_use]
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    /// Force-close every session and clear all indices
    ///
    /// Dropping the senders closes each session's event channel, which the
    /// transport layer observes as end-of-stream.
    pub fn shutdown(&self) {
        let closed = self.sessions.len();
        self.sessions.clear();
        self.recipient_sessions.clear();
        self.room_sessions.clear();
        info!(closed, "Connection registry shut down");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistryLimits::default())
    }
}
