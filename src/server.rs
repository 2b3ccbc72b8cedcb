//! TCP server: listener setup, accept loop, and shutdown coordination.
//!
//! Every accepted connection gets a `Session` registered in the `Hub`, a
//! sender task draining the session's queue onto the write half, and a
//! handler task owning the read half. Both run independently of the accept
//! loop.
//!
//! Lifecycle: `Created -> Listening -> Serving -> ShuttingDown -> Closed`.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::Handler;
use crate::hub::Hub;
use crate::session::{Session, SessionId};
use crate::shutdown::Shutdown;
use chrono::Utc;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Once, OnceLock};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

/// Server lifecycle state. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServerState {
    Created = 0,
    Listening = 1,
    Serving = 2,
    ShuttingDown = 3,
    Closed = 4,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Created,
            1 => ServerState::Listening,
            2 => ServerState::Serving,
            3 => ServerState::ShuttingDown,
            _ => ServerState::Closed,
        }
    }
}

/// Source of incoming connections for [`Server::serve`].
pub trait Accept: Send + Sync {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Server instance
pub struct Server<H> {
    config: Config,
    handler: Arc<H>,
    hub: Arc<Hub>,
    shutdown: Shutdown,
    close_once: Once,
    next_session_id: AtomicU64,
    state: AtomicU8,
    local_addr: OnceLock<SocketAddr>,
}

impl<H: Handler> Server<H> {
    /// Create a new server instance
    pub fn new(config: Config, handler: H) -> Self {
        Server {
            config,
            handler: Arc::new(handler),
            hub: Arc::new(Hub::new()),
            shutdown: Shutdown::new(),
            close_once: Once::new(),
            next_session_id: AtomicU64::new(1),
            state: AtomicU8::new(ServerState::Created as u8),
            local_addr: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// A clone of the server-wide shutdown signal.
    pub fn shutdown_token(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Address the server is listening on, once serving has started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    fn advance(&self, state: ServerState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Bind the configured address and serve until shutdown or a fatal
    /// accept error.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        self.advance(ServerState::Listening);

        let listener = match bind_listener(&self.config.listen, self.config.backlog).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(address = %self.config.listen, error = %e, "Failed to bind");
                self.advance(ServerState::Closed);
                return Err(e);
            }
        };

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Returns `Ok(())` after `close`, or the first non-temporary accept
    /// error. Either way the server is closed when this returns.
    pub async fn serve<L: Accept>(&self, listener: L) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            let _ = self.local_addr.set(addr);
            info!(address = %addr, "Server listening");
        }
        self.advance(ServerState::Serving);

        let result = self.accept_loop(&listener).await;

        self.advance(ServerState::ShuttingDown);
        self.close();
        drop(listener);
        self.advance(ServerState::Closed);
        info!("Server closed");

        result
    }

    async fn accept_loop<L: Accept>(&self, listener: &L) -> Result<(), ServerError> {
        loop {
            if self.shutdown.is_fired() {
                return Ok(());
            }

            let accepted = tokio::select! {
                _ = self.shutdown.fired() => return Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.start_session(stream, peer),
                Err(e) if is_temporary(&e) => {
                    debug!(error = %e, "Temporary accept failure, backing off");
                    tokio::time::sleep(self.config.accept_backoff).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }

    fn start_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            trace!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let id: SessionId = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (session, outbound) = Session::new(id, Some(peer), self.config.queue_capacity);
        let (reader, writer) = stream.into_split();

        self.hub.put(Arc::clone(&session));
        // close() may have destroyed the hub between accept and put
        if self.shutdown.is_fired() {
            self.hub.remove(id);
            session.close();
        }
        debug!(session = id, peer = %peer, "Connection accepted");

        let hub = Arc::clone(&self.hub);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if outbound.run(writer, shutdown).await.is_err() {
                hub.remove(id);
            }
        });

        let hub = Arc::clone(&self.hub);
        let handler = Arc::clone(&self.handler);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            // A panicking handler must still release its session
            let handling = {
                let session = Arc::clone(&session);
                tokio::spawn(async move { handler.handle(session, reader, shutdown).await })
            };
            if let Err(e) = handling.await {
                warn!(session = id, peer = %peer, error = %e, "Handler failed");
            }

            hub.remove(id);
            session.close();

            let duration = Utc::now() - session.connected_at();
            debug!(
                session = id,
                peer = %peer,
                duration_ms = duration.num_milliseconds(),
                "Connection closed"
            );
        });
    }

    /// Request shutdown.
    ///
    /// Fires the shutdown signal and destroys the hub, closing every live
    /// session. Only the first call has any effect; it returns `true`, every
    /// other call returns `false`. Never blocks on I/O.
    pub fn close(&self) -> bool {
        let mut performed = false;

        self.close_once.call_once(|| {
            self.advance(ServerState::ShuttingDown);
            self.shutdown.fire();
            let sessions = self.hub.destroy();
            info!(sessions, "Server shutting down");
            performed = true;
        });

        performed
    }
}

/// Resolve `listen` and create a listening socket with SO_REUSEADDR.
///
/// A bare `:port` listens on all IPv4 interfaces.
async fn bind_listener(listen: &str, backlog: i32) -> Result<TcpListener, ServerError> {
    let target = if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    };

    let mut addrs = tokio::net::lookup_host(target.as_str())
        .await
        .map_err(|e| ServerError::InvalidAddress {
            addr: listen.to_string(),
            source: Some(e),
        })?;
    let addr = addrs.next().ok_or_else(|| ServerError::InvalidAddress {
        addr: listen.to_string(),
        source: None,
    })?;

    create_listener(addr, backlog).map_err(|source| ServerError::Bind {
        addr: listen.to_string(),
        source,
    })
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

/// Accept errors worth retrying: the listener is fine, the failure came
/// from a single aborted handshake or a transient resource shortage.
fn is_temporary(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    matches!(
        e.raw_os_error(),
        Some(code) if code == libc::EMFILE
            || code == libc::ENFILE
            || code == libc::ENOBUFS
            || code == libc::ENOMEM
    )
}
