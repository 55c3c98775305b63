//! Error types for the room layer.

use huddle_protocol::ParticipantId;

/// Errors returned by room membership operations.
///
/// Transport failures never show up here: they are handled inside the
/// connection tasks and resolve into participant or room removal.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room already holds `capacity` participants.
    #[error("room is full")]
    RoomFull,

    /// Another participant already uses this username.
    #[error("username {0:?} is taken")]
    UsernameTaken(String),

    /// This session is already a participant of the room.
    #[error("session already joined this room")]
    AlreadyJoined,

    /// This session was banned from the room.
    #[error("session is banned from this room")]
    Banned,

    /// No participant with this id is in the room.
    #[error("participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    /// The room is closing or closed.
    #[error("room is closing")]
    Closing,
}
