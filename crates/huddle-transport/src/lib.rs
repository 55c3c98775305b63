//! Transport abstraction layer for Huddle.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over a
//! duplex, framed byte stream. A connection is split into a
//! [`FrameReader`] and a [`FrameWriter`] so that one task can sit on the
//! inbound side while another drains the outbound side.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory`: in-process connection pairs, used by tests

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, WebSocketConnection, WebSocketReader, WebSocketTransport,
    WebSocketWriter,
};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single frame travelling over a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A UTF-8 text frame.
    Text(String),
    /// An opaque binary frame.
    Binary(Vec<u8>),
    /// A close frame, optionally carrying a reason string.
    Close(Option<String>),
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts (and upgrades) the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// An accepted connection, before it is handed to its reader/writer tasks.
pub trait Connection: Send + 'static {
    /// The inbound half.
    type Reader: FrameReader;
    /// The outbound half.
    type Writer: FrameWriter;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Splits the connection into independently owned halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// The inbound half of a connection.
pub trait FrameReader: Send + 'static {
    /// Reads the next frame.
    ///
    /// Returns an error when the stream ends without a close frame or the
    /// underlying transport fails.
    fn read_frame(
        &mut self,
    ) -> impl Future<Output = Result<Frame, TransportError>> + Send;
}

/// The outbound half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Writes a single frame.
    fn write_frame(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a normal-closure frame carrying `reason` (if any) and closes
    /// the outbound side.
    fn close(
        &mut self,
        reason: Option<&str>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Extracts a query-string parameter from a request target such as
/// `/ws/room?token=abc`.
///
/// Values are returned verbatim; tokens and ids on this surface are
/// URL-safe already.
pub fn query_param(target: &str, key: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }

    #[test]
    fn test_query_param_finds_token() {
        assert_eq!(
            query_param("/ws/room?token=abc.def", "token").as_deref(),
            Some("abc.def")
        );
    }

    #[test]
    fn test_query_param_among_several() {
        let target = "/ws/room?x=1&token=t0k&y=2";
        assert_eq!(query_param(target, "token").as_deref(), Some("t0k"));
        assert_eq!(query_param(target, "y").as_deref(), Some("2"));
    }

    #[test]
    fn test_query_param_missing() {
        assert_eq!(query_param("/ws/room", "token"), None);
        assert_eq!(query_param("/ws/room?other=1", "token"), None);
    }

    #[test]
    fn test_query_param_empty_value() {
        assert_eq!(query_param("/ws/room?token=", "token").as_deref(), Some(""));
        assert_eq!(query_param("/ws/room?token", "token").as_deref(), Some(""));
    }
}
