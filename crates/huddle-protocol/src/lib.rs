//! Wire protocol for Huddle.
//!
//! This crate defines what travels between a chat room and its clients:
//!
//! - **Identities** ([`RoomId`], [`ParticipantId`], [`SessionId`]) and the
//!   participant [`Role`].
//! - **Events** ([`Event`]): the `{type, data}` envelope broadcast to
//!   every connected participant.
//! - **Close reasons** ([`CloseReason`]): the standardized strings carried
//!   in normal-closure frames.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events become text
//!   frames and back.
//!
//! The protocol layer knows nothing about connections or rooms. It only
//! knows how messages look.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{CloseReason, Event, ParticipantId, Role, RoomId, SessionId};
