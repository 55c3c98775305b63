//! Room registry, membership, and live connection lifecycle for Huddle.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, looks them up, and retires them
//!   when they expire or close
//! - [`Room`]: one chat room: join, kick, ban, close, attach, broadcast
//! - [`RoomConfig`]: timings and queue sizes
//! - [`RoomError`]: why a membership operation was refused
//!
//! # Concurrency
//!
//! Each room guards its membership with its own `RwLock`. Connection I/O
//! and registry notifications always happen after the lock is released,
//! and every teardown path (admin action, heartbeat timeout, write failure,
//! expiry) is idempotent: whichever trigger wins performs the side effects,
//! the rest find nothing left to do.

mod config;
mod connection;
mod error;
mod participant;
mod registry;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use participant::{Candidate, ParticipantView};
pub use registry::RoomRegistry;
pub use room::{CloseCause, Room, RoomSnapshot};
