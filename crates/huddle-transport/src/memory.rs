//! In-process connection pairs.
//!
//! A [`MemoryConnection`] behaves like an accepted socket while the matching
//! [`MemoryPeer`] plays the remote client. The room engine's tests drive
//! whole participant lifecycles through these without touching the network.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Frame, FrameReader, FrameWriter, TransportError};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

/// Frames the server side may write before the peer has to read.
const DEFAULT_CAPACITY: usize = 64;

/// Server-side half of an in-memory connection pair.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::Sender<Frame>,
}

/// Client-side half of an in-memory connection pair.
pub struct MemoryPeer {
    to_server: mpsc::UnboundedSender<Frame>,
    from_server: mpsc::Receiver<Frame>,
}

impl MemoryConnection {
    /// Creates a connected pair with the default outbound capacity.
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        Self::pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a connected pair whose server-to-peer direction buffers at
    /// most `capacity` frames. Once full, writes wait for the peer to read,
    /// which is how a stalled client is simulated.
    pub fn pair_with_capacity(capacity: usize) -> (MemoryConnection, MemoryPeer) {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::channel(capacity.max(1));
        let id = ConnectionId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed));
        (
            MemoryConnection {
                id,
                inbound,
                outbound,
            },
            MemoryPeer {
                to_server,
                from_server,
            },
        )
    }
}

impl Connection for MemoryConnection {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (MemoryReader, MemoryWriter) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: Some(self.outbound),
            },
        )
    }
}

impl MemoryPeer {
    /// Sends a frame to the server side. Returns `false` once the server
    /// side has been dropped.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_server.send(frame).is_ok()
    }

    /// Sends a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Receives the next frame written by the server side, or `None` once
    /// the server side has closed its writer.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Returns a frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }
}

/// Inbound half of a [`MemoryConnection`].
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Frame>,
}

impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.inbound
            .recv()
            .await
            .ok_or_else(|| TransportError::Closed("peer dropped".into()))
    }
}

/// Outbound half of a [`MemoryConnection`].
pub struct MemoryWriter {
    outbound: Option<mpsc::Sender<Frame>>,
}

impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let Some(outbound) = self.outbound.as_ref() else {
            return Err(TransportError::Closed("writer closed".into()));
        };
        outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed("peer dropped".into()))
    }

    async fn close(&mut self, reason: Option<&str>) -> Result<(), TransportError> {
        let Some(outbound) = self.outbound.take() else {
            return Ok(());
        };
        outbound
            .send(Frame::Close(reason.map(str::to_owned)))
            .await
            .map_err(|_| TransportError::Closed("peer dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (conn, mut peer) = MemoryConnection::pair();
        let (mut reader, mut writer) = conn.split();

        assert!(peer.send_text("hi"));
        assert_eq!(reader.read_frame().await.unwrap(), Frame::Text("hi".into()));

        writer.write_frame(Frame::Binary(vec![0])).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Binary(vec![0])));
    }

    #[tokio::test]
    async fn test_close_sends_reason_then_ends_stream() {
        let (conn, mut peer) = MemoryConnection::pair();
        let (_reader, mut writer) = conn.split();

        writer.close(Some("kick")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Close(Some("kick".into()))));
        assert_eq!(peer.recv().await, None);
        assert!(writer.write_frame(Frame::Text("late".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_reader_and_fails_writer() {
        let (conn, peer) = MemoryConnection::pair();
        let (mut reader, mut writer) = conn.split();
        drop(peer);

        assert!(matches!(
            reader.read_frame().await,
            Err(TransportError::Closed(_))
        ));
        assert!(matches!(
            writer.write_frame(Frame::Text("x".into())).await,
            Err(TransportError::Closed(_))
        ));
    }

    #[test]
    fn test_pairs_get_distinct_ids() {
        let (a, _pa) = MemoryConnection::pair();
        let (b, _pb) = MemoryConnection::pair();
        assert_ne!(a.id(), b.id());
    }
}
