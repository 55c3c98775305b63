//! Core protocol types for Huddle's wire format.
//!
//! Everything in this module either travels on the wire (events, close
//! reasons) or names something that does (room, participant, session).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identifier of a chat room.
///
/// Room ids are random hex strings minted by the registry. The newtype keeps
/// them from being confused with session ids or usernames, which are also
/// strings.
///
/// `#[serde(transparent)]` serializes a `RoomId` as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps a raw room id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// A participant's numeric id, unique within one room.
///
/// The admin is always `1`; members are numbered from `2` upward in join
/// order and ids are never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// The id every room assigns to its admin.
    pub const ADMIN: ParticipantId = ParticipantId(1);

    /// The first id handed to a joining member.
    pub const FIRST_MEMBER: ParticipantId = ParticipantId(2);

    /// Returns the next id in sequence.
    pub fn next(self) -> ParticipantId {
        ParticipantId(self.0 + 1)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The caller's browser-session identifier.
///
/// The session id is how a room recognizes a returning participant and how
/// bans stick: a banned session can never join that room again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A participant's role within a room.
///
/// Exactly one admin exists per room: the creator. Everyone else is a
/// member. On the wire roles are lowercase strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The room's creator; may kick, ban, and close.
    Admin,
    /// A participant admitted by invite.
    Member,
}

impl Role {
    /// Returns `true` for [`Role::Admin`].
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// The wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event: what the room broadcasts
// ---------------------------------------------------------------------------

/// An event broadcast to every connected participant of a room.
///
/// Events are serialized as an adjacently tagged envelope:
///
/// ```json
/// {"type": "join", "data": {"id": 2, "username": "bob", "role": "member"}}
/// {"type": "leave", "data": {"id": 2}}
/// {"type": "msg", "data": {"username": "bob", "content": "hi"}}
/// ```
///
/// `tag = "type"` names the variant, `content = "data"` holds its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Event {
    /// A participant's connection came up (or came back).
    Join {
        id: ParticipantId,
        username: String,
        role: Role,
    },
    /// A participant left, was kicked, or was banned.
    Leave { id: ParticipantId },
    /// A chat message, relayed verbatim.
    Msg { username: String, content: String },
}

// ---------------------------------------------------------------------------
// CloseReason: why a connection was closed
// ---------------------------------------------------------------------------

/// The reason string carried in a normal-closure frame.
///
/// Clients switch on these strings to decide what to show, so they are
/// fixed. [`CloseReason::Leave`] is the only reason a *client* sends;
/// every other reason is sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The client is leaving voluntarily.
    Leave,
    /// The participant was kicked by the admin.
    Kick,
    /// The participant was banned by the admin.
    Ban,
    /// The room expired or the server is shutting down.
    Close,
    /// The admin closed the room or departed.
    CloseAdmin,
    /// Sent to the admin's own connection when the admin ends the room.
    CloseUser,
    /// An inbound message exceeded the size limit.
    MessageTooLarge,
    /// The token names a participant the room does not know.
    UserNotExists,
    /// The upgrade request carried no token.
    TokenMissing,
    /// The token failed verification.
    TokenInvalid,
    /// The token names a room that is gone or closing.
    RoomNotExists,
    /// The upgrade request came from a disallowed origin.
    InvalidOrigin,
}

impl CloseReason {
    /// Every close reason, in declaration order.
    pub const ALL: [CloseReason; 12] = [
        CloseReason::Leave,
        CloseReason::Kick,
        CloseReason::Ban,
        CloseReason::Close,
        CloseReason::CloseAdmin,
        CloseReason::CloseUser,
        CloseReason::MessageTooLarge,
        CloseReason::UserNotExists,
        CloseReason::TokenMissing,
        CloseReason::TokenInvalid,
        CloseReason::RoomNotExists,
        CloseReason::InvalidOrigin,
    ];

    /// The wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Leave => "leave",
            CloseReason::Kick => "kick",
            CloseReason::Ban => "ban",
            CloseReason::Close => "close",
            CloseReason::CloseAdmin => "close-admin",
            CloseReason::CloseUser => "close-user",
            CloseReason::MessageTooLarge => "message-too-large",
            CloseReason::UserNotExists => "user-not-exists",
            CloseReason::TokenMissing => "token-missing",
            CloseReason::TokenInvalid => "token-invalid",
            CloseReason::RoomNotExists => "room-not-exists",
            CloseReason::InvalidOrigin => "invalid-origin",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloseReason {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CloseReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCloseReason(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ids_start_after_admin() {
        assert_eq!(ParticipantId::ADMIN.next(), ParticipantId::FIRST_MEMBER);
        assert_eq!(ParticipantId(7).to_string(), "7");
    }

    #[test]
    fn test_role_strings() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Member.as_str(), "member");
        assert!(Role::Admin.is_admin());
        assert!(!Role::Member.is_admin());
    }

    #[test]
    fn test_close_reason_parses_every_wire_string() {
        for reason in CloseReason::ALL {
            assert_eq!(reason.as_str().parse::<CloseReason>().unwrap(), reason);
        }
        assert_eq!("close-admin".parse::<CloseReason>().unwrap(), CloseReason::CloseAdmin);
    }

    #[test]
    fn test_close_reason_rejects_unknown() {
        assert!(matches!(
            "bye".parse::<CloseReason>(),
            Err(ProtocolError::UnknownCloseReason(s)) if s == "bye"
        ));
    }

    #[test]
    fn test_room_id_display_is_bare() {
        let id = RoomId::new("a1b2c3d4e5f6");
        assert_eq!(id.to_string(), "a1b2c3d4e5f6");
        assert_eq!(id.as_str(), "a1b2c3d4e5f6");
    }
}
