//! Session configuration.

use std::time::Duration;

/// Configuration for token issuance.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of participant tokens handed out on create and join.
    ///
    /// Default: 1 hour. Invite tokens ignore this and expire with their room.
    pub token_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(60 * 60),
        }
    }
}
