//! The token service seam.
//!
//! Admission and the upgrade handler only ever talk to a [`TokenService`].
//! The production implementation is [`JwtTokenService`](crate::JwtTokenService);
//! tests swap in their own to simulate signing failures.

use crate::{Claims, InviteClaims, ParticipantClaims, SessionError};

/// Issues and verifies signed tokens.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one service is shared by every handler
/// task for the lifetime of the server.
pub trait TokenService: Send + Sync + 'static {
    /// Signs `claims` into an opaque token string.
    ///
    /// # Errors
    /// `SessionError::Issue` if signing fails.
    fn issue(&self, claims: &Claims) -> Result<String, SessionError>;

    /// Checks the signature and expiry of `token` and returns its claims.
    ///
    /// # Errors
    /// `Expired`, `SignatureMismatch`, or `Malformed`.
    fn verify(&self, token: &str) -> Result<Claims, SessionError>;

    /// Verifies `token` and requires participant claims.
    fn verify_participant(&self, token: &str) -> Result<ParticipantClaims, SessionError> {
        self.verify(token)?.try_into()
    }

    /// Verifies `token` and requires invite claims.
    fn verify_invite(&self, token: &str) -> Result<InviteClaims, SessionError> {
        self.verify(token)?.try_into()
    }
}
