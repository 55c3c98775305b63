//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    Connection, ConnectionId, Frame, FrameReader, FrameWriter, Transport,
    TransportError, query_param,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long a client may take to complete the upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upgraded connections waiting for `accept`.
const UPGRADED_QUEUE: usize = 64;

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Each handshake runs in its own task, so a client that opens a socket and
/// never upgrades holds up nobody but itself.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
    upgraded_tx: mpsc::Sender<WebSocketConnection>,
    upgraded_rx: mpsc::Receiver<WebSocketConnection>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "WebSocket transport listening");
        let (upgraded_tx, upgraded_rx) = mpsc::channel(UPGRADED_QUEUE);
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            upgraded_tx,
            upgraded_rx,
        })
    }

    /// Sets the handshake limit; slower clients are dropped.
    pub fn with_handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        loop {
            tokio::select! {
                Some(conn) = self.upgraded_rx.recv() => return Ok(conn),
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(TransportError::Accept)?;
                    tokio::spawn(upgrade(
                        stream,
                        addr,
                        self.handshake_timeout,
                        self.upgraded_tx.clone(),
                    ));
                }
            }
        }
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Runs the upgrade handshake for one client and queues the result.
async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    limit: Duration,
    upgraded: mpsc::Sender<WebSocketConnection>,
) {
    // The upgrade request's target carries the session token, so it is
    // captured during the handshake.
    let mut target = String::new();
    let handshake = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| {
            target = req.uri().to_string();
            Ok(resp)
        },
    );
    let ws = match tokio::time::timeout(limit, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(%addr, "WebSocket handshake timed out");
            return;
        }
    };

    let id = ConnectionId::new(
        NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
    );
    tracing::debug!(%id, %addr, "accepted WebSocket connection");

    if upgraded
        .send(WebSocketConnection { id, target, ws })
        .await
        .is_err()
    {
        tracing::debug!(%id, "transport gone before accept");
    }
}

/// A single upgraded WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    target: String,
    ws: WsStream,
}

impl WebSocketConnection {
    /// The request target (path and query) of the upgrade request.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Looks up a query-string parameter of the upgrade request.
    pub fn query_param(&self, key: &str) -> Option<String> {
        query_param(&self.target, key)
    }
}

impl Connection for WebSocketConnection {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (WebSocketReader, WebSocketWriter) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketReader { stream },
            WebSocketWriter { sink },
        )
    }
}

/// Inbound half of a [`WebSocketConnection`].
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader for WebSocketReader {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Frame::Text(text.to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Frame::Binary(data.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(Frame::Close(
                        frame.map(|f| f.reason.to_string()),
                    ));
                }
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(TransportError::WebSocket(e)),
                None => {
                    return Err(TransportError::Closed("stream ended".into()));
                }
            }
        }
    }
}

/// Outbound half of a [`WebSocketConnection`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Close(reason) => Message::Close(reason.map(close_frame)),
        };
        self.sink.send(msg).await.map_err(TransportError::WebSocket)
    }

    async fn close(&mut self, reason: Option<&str>) -> Result<(), TransportError> {
        let frame = reason.map(|r| close_frame(r.to_string()));
        let sent = self.sink.send(Message::Close(frame)).await;
        // The close handshake may already be underway on a dying socket.
        let _ = self.sink.close().await;
        sent.map_err(TransportError::WebSocket)
    }
}

fn close_frame(reason: String) -> CloseFrame {
    CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }
}
