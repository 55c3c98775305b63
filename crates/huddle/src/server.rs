//! `HuddleServer` builder and server loop.
//!
//! This is the entry point for running a Huddle chat server. It ties
//! together all the layers: transport → protocol → session → room, and
//! hands out the [`Admission`] service that an HTTP router calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use huddle_room::{RoomConfig, RoomRegistry};
use huddle_session::{SessionConfig, TokenService};
use huddle_transport::{DEFAULT_HANDSHAKE_TIMEOUT, Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Admission, HuddleError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<T: TokenService> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) tokens: Arc<T>,
}

/// Builder for configuring and starting a Huddle server.
///
/// # Example
///
/// ```rust,no_run
/// use huddle::prelude::*;
///
/// # async fn run() -> Result<(), HuddleError> {
/// let server = HuddleServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(JwtTokenService::new(b"server-secret"))
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct HuddleServerBuilder {
    bind_addr: String,
    handshake_timeout: Duration,
    room_config: RoomConfig,
    session_config: SessionConfig,
}

impl HuddleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            room_config: RoomConfig::default(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets how long a client may take to finish the WebSocket upgrade.
    pub fn handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    /// Sets room timings and queue sizes.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener and starts the room registry.
    ///
    /// `tokens` signs and verifies every token the server deals in;
    /// [`JwtTokenService`](huddle_session::JwtTokenService) is the usual
    /// choice.
    pub async fn build<T: TokenService>(self, tokens: T) -> Result<HuddleServer<T>, HuddleError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_handshake_timeout(self.handshake_timeout);

        let registry = Arc::new(RoomRegistry::start(self.room_config));
        let tokens = Arc::new(tokens);
        let admission = Admission::new(
            Arc::clone(&registry),
            Arc::clone(&tokens),
            self.session_config,
        );

        Ok(HuddleServer {
            transport,
            state: Arc::new(ServerState { registry, tokens }),
            admission,
        })
    }
}

impl Default for HuddleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Huddle server.
///
/// Grab [`admission()`](Self::admission) for the router, then call
/// [`run()`](Self::run) to start accepting WebSocket connections.
pub struct HuddleServer<T: TokenService> {
    transport: WebSocketTransport,
    state: Arc<ServerState<T>>,
    admission: Admission<T>,
}

impl<T: TokenService> HuddleServer<T> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The admission service backed by this server's registry.
    pub fn admission(&self) -> &Admission<T> {
        &self.admission
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.state.registry
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), HuddleError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` completes, then closes every
    /// room.
    ///
    /// Each accepted connection gets its own handler task, which checks the
    /// upgrade token and attaches the connection to its room.
    pub async fn run_until(
        mut self,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), HuddleError> {
        tracing::info!("Huddle server running");
        tokio::pin!(signal);

        loop {
            tokio::select! {
                () = &mut signal => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Huddle server shutting down");
        self.transport.shutdown().await?;
        self.state.registry.shutdown().await;
        Ok(())
    }
}
