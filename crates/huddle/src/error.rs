//! Unified error type for Huddle.

use huddle_protocol::ProtocolError;
use huddle_room::RoomError;
use huddle_session::SessionError;
use huddle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `huddle` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant generates `From` impls, so `?` converts sub-crate errors
/// automatically.
///
/// Admission requests have their own caller-facing error,
/// [`AdmissionError`](crate::AdmissionError), which carries a status code.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown close reason).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (token issue or verification).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, banned, closing).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Closed("gone".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Transport(_)));
        assert!(huddle_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownCloseReason("bye".into());
        let huddle_err: HuddleError = err.into();
        assert!(matches!(huddle_err, HuddleError::Protocol(_)));
        assert!(huddle_err.to_string().contains("bye"));
    }

    #[test]
    fn test_from_session_error() {
        let huddle_err: HuddleError = SessionError::Expired.into();
        assert!(matches!(huddle_err, HuddleError::Session(_)));
        assert_eq!(huddle_err.to_string(), "token expired");
    }

    #[test]
    fn test_from_room_error() {
        let huddle_err: HuddleError = RoomError::RoomFull.into();
        assert!(matches!(huddle_err, HuddleError::Room(_)));
        assert_eq!(huddle_err.to_string(), "room is full");
    }
}
