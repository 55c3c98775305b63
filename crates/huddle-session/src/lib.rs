//! Token-based identity for Huddle.
//!
//! Nothing about a participant is kept server-side between requests except
//! the room's membership table. Who a caller is travels inside a signed
//! token:
//!
//! 1. **Participant tokens** ([`ParticipantClaims`]): handed out on create
//!    and join, presented on the WebSocket upgrade and on admin actions.
//! 2. **Invite tokens** ([`InviteClaims`]): shown to the admin, shared out
//!    of band, and exchanged for a participant token on join.
//!
//! Both kinds are variants of one tagged [`Claims`] union, so a token of
//! the wrong kind is rejected by type rather than by a missing field.
//!
//! # How it fits in the stack
//!
//! ```text
//! Admission / upgrade handler (above)  ← verify tokens, issue new ones
//!     ↕
//! Session Layer (this crate)  ← TokenService, Claims
//!     ↕
//! Protocol Layer (below)  ← RoomId, ParticipantId, Role
//! ```

mod claims;
mod config;
mod error;
mod jwt;
mod token;

pub use claims::{Claims, Expiring, InviteClaims, ParticipantClaims, expiry_after, unix_now};
pub use config::SessionConfig;
pub use error::SessionError;
pub use jwt::JwtTokenService;
pub use token::TokenService;
