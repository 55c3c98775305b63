//! Error types for the transport layer.

/// Errors that can occur in the transport layer.
///
/// Inside a room these never reach a caller. The connection tasks log them
/// and let the heartbeat or an explicit `leave` decide what a failure means.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The upgrade handshake, or a frame on an upgraded socket, failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[source] tokio_tungstenite::tungstenite::Error),

    /// The other side is gone: its stream ended without a close frame, or
    /// it dropped its end of the connection.
    #[error("connection closed: {0}")]
    Closed(String),
}
