//! # Huddle
//!
//! Ephemeral, invite-gated group chat rooms over WebSocket.
//!
//! A room lives for a fixed time, holds a handful of participants, and
//! forgets everything when it closes. The admin creates it, shares an
//! invite token, and may kick, ban, or close at any time. Participants
//! connect with the token they got from admission and exchange text
//! messages that the room fans out to everyone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::prelude::*;
//!
//! # async fn run() -> Result<(), HuddleError> {
//! let server = HuddleServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(JwtTokenService::new(b"server-secret"))
//!     .await?;
//!
//! // Wire `server.admission()` into your HTTP router, then:
//! server.run().await
//! # }
//! ```

mod admission;
mod error;
mod handler;
mod server;

pub use admission::{
    Admission, AdmissionError, CreateRoomRequest, CreateRoomResponse, JoinRoomRequest,
    JoinRoomResponse, ParticipantRequest, RoomDetails,
};
pub use error::HuddleError;
pub use server::{HuddleServer, HuddleServerBuilder};

/// Everything needed to run a server and call admission.
pub mod prelude {
    pub use crate::{
        Admission, AdmissionError, CreateRoomRequest, CreateRoomResponse, HuddleError,
        HuddleServer, HuddleServerBuilder, JoinRoomRequest, JoinRoomResponse,
        ParticipantRequest, RoomDetails,
    };
    pub use huddle_protocol::{CloseReason, Event, ParticipantId, Role, RoomId, SessionId};
    pub use huddle_room::{CloseCause, ParticipantView, Room, RoomConfig, RoomRegistry};
    pub use huddle_session::{JwtTokenService, SessionConfig, TokenService};
}
