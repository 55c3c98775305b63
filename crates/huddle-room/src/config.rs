//! Room configuration.

use std::time::Duration;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Timing and sizing knobs shared by every room in a registry.
///
/// The defaults are the production values; tests shrink them.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long a room lives before its scheduled close.
    pub ttl: Duration,

    /// How long a joined member may stay without attaching a connection
    /// before being silently evicted. The admin has no grace timer.
    pub admission_grace: Duration,

    /// Interval between heartbeat probes. The first probe goes out one
    /// interval after the connection is attached.
    pub heartbeat_interval: Duration,

    /// A connection that has been probed and has not acknowledged anything
    /// for longer than this is considered dead. A single write the peer
    /// holds up for this long counts as dead too.
    pub heartbeat_timeout: Duration,

    /// Largest inbound frame payload, in bytes, before the sender is
    /// disconnected with `message-too-large`.
    pub max_message_bytes: usize,

    /// Per-participant outgoing queue length. Broadcasts to a full queue
    /// are dropped for that recipient.
    pub outbox_capacity: usize,

    /// Length of the registry's queue of rooms awaiting scheduled close.
    pub cleanup_queue_capacity: usize,

    /// Upper bound on writing a close frame to a peer that has stopped
    /// reading.
    pub close_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            admission_grace: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            max_message_bytes: 1024,
            outbox_capacity: 20,
            cleanup_queue_capacity: 50,
            close_timeout: Duration::from_secs(5),
        }
    }
}
