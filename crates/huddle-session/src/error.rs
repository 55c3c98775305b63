//! Error types for the session layer.

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// The token could not be parsed or its claims are not well formed.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token was not signed with this server's key.
    #[error("token signature mismatch")]
    SignatureMismatch,

    /// The token is valid but carries the other kind of claims, e.g. an
    /// invite presented where a participant token is required.
    #[error("expected {expected} claims, got {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },

    /// Signing a token failed.
    #[error("token issuance failed: {0}")]
    Issue(String),
}
