//! Accept loop and per-session pipeline.
//!
//! The gateway binds one TCP listener and runs each accepted connection
//! through an independent pipeline: parse the handshake (capturing the
//! consumed bytes), resolve the domain to a backend, dial it, replay the
//! captured bytes, and splice. A pipeline failure closes that session
//! only; an accept failure stops the whole service.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use super::handshake::read_handshake;
use super::relay::{connect_backend, splice, DEFAULT_CONNECT_TIMEOUT};
use super::replay::ReplayReader;
use super::router::{routing_key, RouteDecision, ServerMapping};
use super::wire::HandshakeError;

/// A failure terminal to a single session.
///
/// Never escalated past the session's own task; the client socket (and
/// the backend socket, once dialed) are closed by drop on every path.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The client's first packet could not be parsed as a handshake.
    #[error("failed to read handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// The resolved backend could not be dialed.
    #[error("failed to connect to backend {addr}: {source}")]
    BackendUnreachable { addr: String, source: io::Error },

    /// The captured handshake bytes could not be written to the backend.
    #[error("failed to forward handshake bytes: {0}")]
    Forward(#[source] io::Error),

    /// A relay leg failed while splicing.
    #[error("relay failed: {0}")]
    Relay(#[source] io::Error),
}

/// Counters shared across all sessions of a gateway.
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being handled.
    pub connections_active: AtomicU64,
    /// Sessions dropped because the handshake did not parse.
    pub handshake_failed: AtomicU64,
    /// Sessions routed to a backend.
    pub routes_matched: AtomicU64,
    /// Sessions closed because no route matched and no default exists.
    pub routes_missed: AtomicU64,
    /// Sessions dropped because the backend could not be dialed.
    pub backend_failed: AtomicU64,
    /// Bytes relayed client to backend (handshake replay included).
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed backend to client.
    pub bytes_from_backend: AtomicU64,
}

/// The handshake-routing gateway.
///
/// Holds the bound listener, the immutable routing table, and the shared
/// session-id counter. Sessions share nothing else.
pub struct Gateway {
    listener: TcpListener,
    mapping: Arc<ServerMapping>,
    connect_timeout: Duration,
    next_session_id: AtomicU64,
    sessions: TaskTracker,
    stats: Arc<GatewayStats>,
}

impl Gateway {
    /// Bind the listen address. Bind failure is fatal: the gateway never
    /// starts serving.
    pub async fn bind(listen_addr: &str, mapping: ServerMapping) -> io::Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        Ok(Self {
            listener,
            mapping: Arc::new(mapping),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            next_session_id: AtomicU64::new(0),
            sessions: TaskTracker::new(),
            stats: Arc::new(GatewayStats::default()),
        })
    }

    /// Override the backend connect timeout.
    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) {
        self.connect_timeout = connect_timeout;
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Gateway counters.
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Accept connections until the listener fails.
    ///
    /// Each accepted connection gets the next session id and its own
    /// tracked task; the loop never waits on a session. An accept error
    /// is terminal: in-flight sessions drain naturally and the error is
    /// returned to the caller.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let listen_addr = self.listener.local_addr()?;
        info!(listen_addr = %listen_addr, "Gateway is listening");

        loop {
            let (client, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept failed, shutting down");
                    self.sessions.close();
                    self.sessions.wait().await;
                    return Err(e);
                }
            };

            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
            self.stats
                .connections_accepted
                .fetch_add(1, Ordering::Relaxed);
            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

            let gateway = Arc::clone(&self);
            self.sessions.spawn(
                async move {
                    info!("Accepted connection");
                    match gateway.handle_session(client).await {
                        Ok(()) => debug!("Session finished"),
                        Err(e @ SessionError::BackendUnreachable { .. }) => {
                            warn!(error = %e, "Session failed");
                        }
                        Err(e) => debug!(error = %e, "Session failed"),
                    }
                    gateway
                        .stats
                        .connections_active
                        .fetch_sub(1, Ordering::Relaxed);
                }
                .instrument(tracing::info_span!(
                    "session",
                    id = session_id,
                    peer = %peer_addr
                )),
            );
        }
    }

    /// Run one session to completion.
    ///
    /// On any return, success or failure, both sockets are dropped and
    /// thereby closed. No bytes are ever sent back to the client by the
    /// gateway itself.
    async fn handle_session(&self, client: TcpStream) -> Result<(), SessionError> {
        let mut reader = ReplayReader::new(client);
        let handshake = match read_handshake(&mut reader).await {
            Ok(handshake) => handshake,
            Err(e) => {
                self.stats.handshake_failed.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };
        let (mut client, replayed) = reader.into_parts();

        let domain = routing_key(&handshake.server_address);
        debug!(
            domain = %domain,
            protocol_version = handshake.protocol_version,
            server_port = handshake.server_port,
            next_state = handshake.next_state,
            "Handshake received"
        );

        let backend_addr = match self.mapping.resolve(domain) {
            RouteDecision::Backend(addr) => {
                self.stats.routes_matched.fetch_add(1, Ordering::Relaxed);
                addr
            }
            RouteDecision::NoRoute => {
                self.stats.routes_missed.fetch_add(1, Ordering::Relaxed);
                debug!(domain = %domain, "No route for domain");
                return Ok(());
            }
        };
        info!(domain = %domain, backend_addr = %backend_addr, "Routing session");

        let mut backend = match connect_backend(backend_addr, self.connect_timeout).await {
            Ok(backend) => backend,
            Err(source) => {
                self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
                return Err(SessionError::BackendUnreachable {
                    addr: backend_addr.to_string(),
                    source,
                });
            }
        };

        // The backend must see the handshake bytes before anything the
        // client sends after it.
        backend
            .write_all(&replayed)
            .await
            .map_err(SessionError::Forward)?;
        debug!(replayed_bytes = replayed.len(), "Forwarded handshake to backend");

        let (to_backend, from_backend) = splice(&mut client, &mut backend)
            .await
            .map_err(SessionError::Relay)?;

        self.stats
            .bytes_to_backend
            .fetch_add(replayed.len() as u64 + to_backend, Ordering::Relaxed);
        self.stats
            .bytes_from_backend
            .fetch_add(from_backend, Ordering::Relaxed);

        debug!(
            bytes_to_backend = to_backend,
            bytes_from_backend = from_backend,
            "Session closed"
        );
        Ok(())
    }
}
