//! Participants and their live links.

use std::sync::Arc;

use huddle_protocol::{CloseReason, ParticipantId, Role, SessionId};
use huddle_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Someone asking to join a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub session_id: SessionId,
    pub username: String,
}

impl Candidate {
    pub fn new(session_id: impl Into<SessionId>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
        }
    }
}

/// A read-only view of one participant, as listed by room snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub username: String,
    pub role: Role,
    /// Whether a live connection is currently attached.
    pub connected: bool,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A member of a room, keyed in the room by session id.
///
/// ```text
///   Pending ──(attach)──→ Connected ──(depart/kick/ban/close)──→ gone
///                            ↑   │
///                            └───┘ (attach supersedes the old link)
/// ```
pub(crate) struct Participant {
    pub(crate) session_id: SessionId,
    pub(crate) id: ParticipantId,
    pub(crate) username: String,
    pub(crate) role: Role,
    pub(crate) link: Option<Link>,
    /// Admission-grace timer; cancelled on attach.
    pub(crate) grace: Option<JoinHandle<()>>,
}

impl Participant {
    pub(crate) fn new(
        session_id: SessionId,
        id: ParticipantId,
        username: String,
        role: Role,
    ) -> Self {
        Self {
            session_id,
            id,
            username,
            role,
            link: None,
            grace: None,
        }
    }

    pub(crate) fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            connected: self.link.is_some(),
        }
    }

    /// Cancels the grace timer and hands back the live link, if any.
    pub(crate) fn detach(mut self) -> Option<Link> {
        self.cancel_grace();
        self.link.take()
    }

    pub(crate) fn cancel_grace(&mut self) {
        if let Some(grace) = self.grace.take() {
            grace.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// The room's handle on one attached connection and its two tasks.
pub(crate) struct Link {
    pub(crate) conn_id: ConnectionId,
    /// Encoded events for the write task, in order.
    pub(crate) outbox: mpsc::Sender<Arc<str>>,
    /// Tells the write task to send a close frame and stop.
    shutdown: oneshot::Sender<Option<CloseReason>>,
    /// Never receives a value; yields `None` once both tasks dropped their
    /// sender clones.
    done: mpsc::Receiver<()>,
}

impl Link {
    pub(crate) fn new(
        conn_id: ConnectionId,
        outbox: mpsc::Sender<Arc<str>>,
        shutdown: oneshot::Sender<Option<CloseReason>>,
        done: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            conn_id,
            outbox,
            shutdown,
            done,
        }
    }

    /// Stops both tasks of this link and waits until they have exited.
    ///
    /// The write task closes the connection with `reason` on its way out.
    /// Must not be awaited by a task that still holds a `done` sender of
    /// this same link.
    pub(crate) async fn shut_down(self, reason: Option<CloseReason>) {
        let Link {
            shutdown,
            mut done,
            outbox,
            ..
        } = self;
        let _ = shutdown.send(reason);
        drop(outbox);
        let _ = done.recv().await;
    }
}
