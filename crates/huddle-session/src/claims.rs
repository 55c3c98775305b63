//! Token claims.
//!
//! A token carries exactly one of two claim shapes. They are modelled as a
//! tagged union so that the `kind` field, not the presence of optional
//! fields, decides what a token is:
//!
//! ```json
//! {"kind": "participant", "participantId": 2, "username": "bob",
//!  "role": "member", "roomId": "a1b2c3d4e5f6", "exp": 1700000000}
//! {"kind": "invite", "roomId": "a1b2c3d4e5f6", "secret": "…", "exp": 1700000000}
//! ```

use std::time::Duration;

use chrono::Utc;
use huddle_protocol::{ParticipantId, Role, RoomId};
use serde::{Deserialize, Serialize};

use crate::SessionError;

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// The unix timestamp `ttl` from now, saturating on overflow.
pub fn expiry_after(ttl: Duration) -> i64 {
    let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    unix_now().saturating_add(secs)
}

// ---------------------------------------------------------------------------
// Expiring
// ---------------------------------------------------------------------------

/// Anything that carries an absolute expiry in unix seconds.
pub trait Expiring {
    /// The `exp` claim.
    fn expires_at(&self) -> i64;

    /// Whether the claims have expired at `now` (unix seconds).
    fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at() < now
    }
}

// ---------------------------------------------------------------------------
// Claim shapes
// ---------------------------------------------------------------------------

/// Identifies one participant of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantClaims {
    pub participant_id: ParticipantId,
    pub username: String,
    pub role: Role,
    pub room_id: RoomId,
    pub exp: i64,
}

impl ParticipantClaims {
    /// Builds claims that expire `ttl` from now.
    pub fn new(
        participant_id: ParticipantId,
        username: impl Into<String>,
        role: Role,
        room_id: RoomId,
        ttl: Duration,
    ) -> Self {
        Self {
            participant_id,
            username: username.into(),
            role,
            room_id,
            exp: expiry_after(ttl),
        }
    }
}

/// Grants the bearer the right to join one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteClaims {
    pub room_id: RoomId,
    pub secret: String,
    pub exp: i64,
}

impl Expiring for ParticipantClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl Expiring for InviteClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

// ---------------------------------------------------------------------------
// Claims union
// ---------------------------------------------------------------------------

/// The payload of any token this crate issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Claims {
    Participant(ParticipantClaims),
    Invite(InviteClaims),
}

impl Claims {
    /// Short name of the variant, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Claims::Participant(_) => "participant",
            Claims::Invite(_) => "invite",
        }
    }
}

impl Expiring for Claims {
    fn expires_at(&self) -> i64 {
        match self {
            Claims::Participant(c) => c.exp,
            Claims::Invite(c) => c.exp,
        }
    }
}

impl From<ParticipantClaims> for Claims {
    fn from(claims: ParticipantClaims) -> Self {
        Claims::Participant(claims)
    }
}

impl From<InviteClaims> for Claims {
    fn from(claims: InviteClaims) -> Self {
        Claims::Invite(claims)
    }
}

impl TryFrom<Claims> for ParticipantClaims {
    type Error = SessionError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        match claims {
            Claims::Participant(c) => Ok(c),
            other => Err(SessionError::WrongKind {
                expected: "participant",
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<Claims> for InviteClaims {
    type Error = SessionError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        match claims {
            Claims::Invite(c) => Ok(c),
            other => Err(SessionError::WrongKind {
                expected: "invite",
                found: other.kind(),
            }),
        }
    }
}
