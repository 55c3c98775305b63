//! A single chat room: membership, bans, broadcast, and closure.
//!
//! All mutable state lives behind one `tokio::sync::RwLock` per room. The
//! rule every method follows: decide and mutate under the lock, then
//! release it before touching a connection or notifying the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use huddle_protocol::{
    CloseReason, Codec, Event, JsonCodec, ParticipantId, Role, RoomId, SessionId,
};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::participant::{Link, Participant};
use crate::{Candidate, ParticipantView, RoomConfig, RoomError};

// ---------------------------------------------------------------------------
// CloseCause
// ---------------------------------------------------------------------------

/// Why a room is being closed. Decides the close reason each participant's
/// connection receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The room's TTL ran out, or the registry is shutting down.
    Scheduled,
    /// The admin closed the room explicitly.
    AdminClosed,
    /// The admin left or their connection died.
    AdminDeparted,
}

impl CloseCause {
    /// The close reason sent to a participant holding `role`.
    ///
    /// Members of an admin-ended room see `close-admin`; the admin's own
    /// connection sees `close-user`.
    pub fn reason_for(self, role: Role) -> CloseReason {
        match (self, role) {
            (CloseCause::Scheduled, _) => CloseReason::Close,
            (_, Role::Admin) => CloseReason::CloseUser,
            (_, Role::Member) => CloseReason::CloseAdmin,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of a room's public state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub capacity: usize,
    /// Unix seconds.
    pub expires_at: i64,
    /// Ordered by participant id.
    pub participants: Vec<ParticipantView>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// An ephemeral chat room.
///
/// Rooms are created by the [`RoomRegistry`](crate::RoomRegistry) and
/// always handled through an `Arc<Room>`.
pub struct Room {
    id: RoomId,
    secret: String,
    capacity: usize,
    expires_at: i64,
    pub(crate) config: RoomConfig,
    pub(crate) inner: RwLock<RoomInner>,
    closed_tx: mpsc::UnboundedSender<RoomId>,
}

pub(crate) struct RoomInner {
    /// Keyed by session id.
    pub(crate) participants: HashMap<SessionId, Participant>,
    banned: HashSet<SessionId>,
    next_id: ParticipantId,
    pub(crate) closing: bool,
    expiry: Option<JoinHandle<()>>,
}

impl RoomInner {
    fn find_by_id(&self, id: ParticipantId) -> Option<SessionId> {
        self.participants
            .values()
            .find(|p| p.id == id)
            .map(|p| p.session_id.clone())
    }
}

impl Room {
    /// Builds a room with `admin` already joined as participant 1.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: RoomId,
        secret: String,
        capacity: usize,
        admin: Candidate,
        expires_at: i64,
        expiry: JoinHandle<()>,
        config: RoomConfig,
        closed_tx: mpsc::UnboundedSender<RoomId>,
    ) -> Arc<Self> {
        let admin = Participant::new(
            admin.session_id,
            ParticipantId::ADMIN,
            admin.username,
            Role::Admin,
        );
        let mut participants = HashMap::new();
        participants.insert(admin.session_id.clone(), admin);

        Arc::new(Self {
            id,
            secret,
            capacity,
            expires_at,
            config,
            inner: RwLock::new(RoomInner {
                participants,
                banned: HashSet::new(),
                next_id: ParticipantId::FIRST_MEMBER,
                closing: false,
                expiry: Some(expiry),
            }),
            closed_tx,
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unix seconds at which the room is scheduled to close.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// The admission secret embedded in invite tokens.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Compares a presented admission secret with this room's.
    pub fn secret_matches(&self, secret: &str) -> bool {
        self.secret == secret
    }

    pub async fn is_closing(&self) -> bool {
        self.inner.read().await.closing
    }

    pub async fn participant_count(&self) -> usize {
        self.inner.read().await.participants.len()
    }

    /// Whether `session_id` is on this room's ban list.
    pub async fn is_banned(&self, session_id: &SessionId) -> bool {
        self.inner.read().await.banned.contains(session_id)
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.read().await;
        let mut participants: Vec<_> =
            inner.participants.values().map(Participant::view).collect();
        participants.sort_by_key(|p| p.id);
        RoomSnapshot {
            room_id: self.id.clone(),
            capacity: self.capacity,
            expires_at: self.expires_at,
            participants,
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Admits `candidate` as a member and returns its participant id.
    ///
    /// Every admission check and the insert happen under one write lock,
    /// so concurrent joins can never overfill the room. Checks run in
    /// order: already joined, banned, full, username taken.
    pub async fn join(self: &Arc<Self>, candidate: Candidate) -> Result<ParticipantId, RoomError> {
        let mut inner = self.inner.write().await;
        if inner.closing {
            return Err(RoomError::Closing);
        }
        if inner.participants.contains_key(&candidate.session_id) {
            return Err(RoomError::AlreadyJoined);
        }
        if inner.banned.contains(&candidate.session_id) {
            return Err(RoomError::Banned);
        }
        if inner.participants.len() >= self.capacity {
            return Err(RoomError::RoomFull);
        }
        if inner
            .participants
            .values()
            .any(|p| p.username == candidate.username)
        {
            return Err(RoomError::UsernameTaken(candidate.username));
        }

        let id = inner.next_id;
        inner.next_id = id.next();

        let mut participant =
            Participant::new(candidate.session_id, id, candidate.username, Role::Member);
        participant.grace = Some(self.spawn_grace_timer(participant.session_id.clone(), id));

        tracing::info!(
            room_id = %self.id,
            participant_id = %id,
            username = %participant.username,
            participants = inner.participants.len() + 1,
            "participant joined"
        );
        inner
            .participants
            .insert(participant.session_id.clone(), participant);
        Ok(id)
    }

    /// Evicts a member that never attached a connection.
    fn spawn_grace_timer(self: &Arc<Self>, session_id: SessionId, id: ParticipantId) -> JoinHandle<()> {
        let room: Weak<Room> = Arc::downgrade(self);
        let grace = self.config.admission_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(room) = room.upgrade() {
                room.evict_unattached(&session_id, id).await;
            }
        })
    }

    async fn evict_unattached(&self, session_id: &SessionId, id: ParticipantId) {
        let mut inner = self.inner.write().await;
        if inner.closing {
            return;
        }
        let pending = inner
            .participants
            .get(session_id)
            .is_some_and(|p| p.id == id && p.link.is_none());
        if pending {
            inner.participants.remove(session_id);
            tracing::info!(
                room_id = %self.id,
                participant_id = %id,
                "participant never connected, evicted"
            );
        }
    }

    /// Removes a participant and closes its connection with `kick`.
    pub async fn kick(&self, id: ParticipantId) -> Result<(), RoomError> {
        self.expel(id, false).await
    }

    /// Removes a participant, bans its session, and closes its connection
    /// with `ban`.
    pub async fn ban(&self, id: ParticipantId) -> Result<(), RoomError> {
        self.expel(id, true).await
    }

    async fn expel(&self, id: ParticipantId, ban: bool) -> Result<(), RoomError> {
        let removed = {
            let mut inner = self.inner.write().await;
            if inner.closing {
                return Err(RoomError::Closing);
            }
            let session_id = inner
                .find_by_id(id)
                .ok_or(RoomError::ParticipantNotFound(id))?;
            if ban {
                inner.banned.insert(session_id.clone());
            }
            inner
                .participants
                .remove(&session_id)
                .ok_or(RoomError::ParticipantNotFound(id))?
        };

        let reason = if ban { CloseReason::Ban } else { CloseReason::Kick };
        tracing::info!(room_id = %self.id, participant_id = %id, %reason, "participant removed");

        if let Some(link) = removed.detach() {
            link.shut_down(Some(reason)).await;
        }
        self.broadcast(&Event::Leave { id }).await;
        Ok(())
    }

    /// Silently drops a participant that was admitted but whose token could
    /// not be issued. No event is broadcast.
    pub async fn revoke(&self, id: ParticipantId) -> bool {
        let removed = {
            let mut inner = self.inner.write().await;
            match inner.find_by_id(id) {
                Some(session_id) => inner.participants.remove(&session_id),
                None => None,
            }
        };
        match removed {
            Some(participant) => {
                tracing::warn!(room_id = %self.id, participant_id = %id, "participant revoked");
                if let Some(link) = participant.detach() {
                    link.shut_down(None).await;
                }
                true
            }
            None => false,
        }
    }

    /// Closes the room.
    ///
    /// Only the first call does anything and returns `true`: it detaches
    /// every participant, cancels the expiry and grace timers, closes each
    /// connection with the cause's reason, and announces the closure to the
    /// registry. Later calls return `false`.
    pub async fn close(&self, cause: CloseCause) -> bool {
        let detached: Vec<(Role, Link)> = {
            let mut inner = self.inner.write().await;
            if inner.closing {
                return false;
            }
            inner.closing = true;
            if let Some(expiry) = inner.expiry.take() {
                expiry.abort();
            }
            inner
                .participants
                .drain()
                .filter_map(|(_, p)| {
                    let role = p.role;
                    p.detach().map(|link| (role, link))
                })
                .collect()
        };

        tracing::info!(
            room_id = %self.id,
            ?cause,
            connections = detached.len(),
            "room closing"
        );

        join_all(
            detached
                .into_iter()
                .map(|(role, link)| link.shut_down(Some(cause.reason_for(role)))),
        )
        .await;

        let _ = self.closed_tx.send(self.id.clone());
        true
    }

    // -----------------------------------------------------------------------
    // Broadcast
    // -----------------------------------------------------------------------

    /// Encodes `event` once and offers it to every connected participant.
    ///
    /// Never waits on a recipient: a full outgoing queue drops the event
    /// for that recipient only.
    pub async fn broadcast(&self, event: &Event) {
        let payload: Arc<str> = match JsonCodec.encode(event) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::warn!(room_id = %self.id, error = %e, "failed to encode event");
                return;
            }
        };

        let inner = self.inner.read().await;
        for participant in inner.participants.values() {
            let Some(link) = &participant.link else {
                continue;
            };
            if link.outbox.try_send(Arc::clone(&payload)).is_err() {
                tracing::debug!(
                    room_id = %self.id,
                    participant_id = %participant.id,
                    "outgoing queue full, event dropped"
                );
            }
        }
    }
}
