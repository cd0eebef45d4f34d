use core::fmt::{self, Debug, Display};
use core::net::SocketAddr;
use core::sync::atomic::{AtomicU32, Ordering};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn, Instrument as _};

use crate::frame::{read_i32, Accept};
use crate::{
    serve, Cipher, Connection, ConnectionId, Fault, FaultObserver, HandlerTable, Invoker,
    ServerConfig,
};

/// Observer notified of connections that failed to establish
pub type ConnectFaultObserver = Arc<dyn Fn(Option<SocketAddr>, &AcceptError) + Send + Sync>;

/// Error returned by [`Server::accept`]
pub enum AcceptError {
    /// I/O error
    IO(std::io::Error),
    /// Handshake signal is neither zero nor a positive connection identifier
    InvalidSignal(i32),
    /// Callback stream names a connection that is not registered
    UnknownConnection(ConnectionId),
    /// Connection already has an active callback stream
    CallbackAttached(ConnectionId),
    /// All connection identifiers are in use
    Exhausted,
}

impl Debug for AcceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(err) => Debug::fmt(err, f),
            _ => Display::fmt(self, f),
        }
    }
}

impl Display for AcceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(err) => Display::fmt(err, f),
            Self::InvalidSignal(v) => write!(f, "invalid handshake signal: {v}"),
            Self::UnknownConnection(id) => {
                write!(f, "callback stream for unknown connection `{id}`")
            }
            Self::CallbackAttached(id) => {
                write!(f, "connection `{id}` already has a callback stream")
            }
            Self::Exhausted => f.write_str("connection identifiers exhausted"),
        }
    }
}

impl std::error::Error for AcceptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IO(err) => Some(err),
            _ => None,
        }
    }
}

/// Kind of stream established by a successful handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accepted {
    /// New connection, served on a dedicated task
    Primary(ConnectionId),
    /// Callback stream attached to an existing connection
    Callback(ConnectionId),
}

struct Inner {
    handlers: HandlerTable,
    cipher: Option<Cipher>,
    connections: std::sync::Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU32,
    on_fault: Option<FaultObserver>,
    on_connect_fault: Option<ConnectFaultObserver>,
}

/// Builds a [Server]
#[derive(Default)]
pub struct ServerBuilder {
    handlers: HandlerTable,
    cipher: Option<Cipher>,
    on_fault: Option<FaultObserver>,
    on_connect_fault: Option<ConnectFaultObserver>,
}

impl ServerBuilder {
    /// Encrypts all streams with `cipher`
    #[must_use]
    pub fn cipher(mut self, cipher: Option<Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Sets the observer of handler and connection faults
    #[must_use]
    pub fn on_fault(mut self, f: impl Fn(ConnectionId, &Fault) + Send + Sync + 'static) -> Self {
        self.on_fault = Some(Arc::new(f));
        self
    }

    /// Sets the observer of failed handshakes
    #[must_use]
    pub fn on_connect_fault(
        mut self,
        f: impl Fn(Option<SocketAddr>, &AcceptError) + Send + Sync + 'static,
    ) -> Self {
        self.on_connect_fault = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn build(self) -> Server {
        Server(Arc::new(Inner {
            handlers: self.handlers,
            cipher: self.cipher,
            connections: std::sync::Mutex::default(),
            next_id: AtomicU32::new(1),
            on_fault: self.on_fault,
            on_connect_fault: self.on_connect_fault,
        }))
    }
}

/// Server accepting connections and serving [HandlerTable] methods on them.
///
/// Clones share the connection registry.
#[derive(Clone)]
pub struct Server(Arc<Inner>);

impl Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("handlers", &self.0.handlers)
            .field("encrypted", &self.0.cipher.is_some())
            .field("connections", &self.connections())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Constructs a new unencrypted [Server]
    #[must_use]
    pub fn new(handlers: HandlerTable) -> Self {
        Self::builder(handlers).build()
    }

    #[must_use]
    pub fn builder(handlers: HandlerTable) -> ServerBuilder {
        ServerBuilder {
            handlers,
            ..ServerBuilder::default()
        }
    }

    /// Constructs a new [Server], loading key material named by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the key file exists, but cannot be loaded
    pub async fn from_config(config: &ServerConfig, handlers: HandlerTable) -> std::io::Result<Self> {
        let cipher = config.cipher().await?;
        Ok(Self::builder(handlers).cipher(cipher).build())
    }

    #[must_use]
    pub fn handlers(&self) -> &HandlerTable {
        &self.0.handlers
    }

    /// Identifiers of all registered connections in ascending order
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.registry().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Invoker calling back into the client of connection `id`, `None` if the connection is not
    /// registered or has no active callback stream
    #[must_use]
    pub fn invoker(&self, id: ConnectionId) -> Option<Invoker> {
        self.connection(id)?
            .callback()
            .filter(Invoker::is_active)
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.registry().get(&id).cloned()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.0
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Disconnects connection `id`, closing its streams and any callback stream.
    ///
    /// Returns `false` if no such connection is registered.
    #[instrument(level = "trace", skip(self), ret(level = "trace"))]
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.registry().remove(&id) else {
            return false;
        };
        debug!(id, "disconnecting");
        conn.close();
        true
    }

    /// Accepts a single stream on an [Accept] and performs the handshake.
    ///
    /// New connections are registered and served on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting the stream or the handshake has failed
    #[instrument(level = "trace", skip_all, ret(level = "trace"))]
    pub async fn accept(&self, listener: impl Accept) -> Result<Accepted, AcceptError> {
        let (peer, tx, rx) = listener.accept().await.map_err(AcceptError::IO)?;
        self.establish(peer, tx, rx).await
    }

    /// Accepts streams on an [Accept] indefinitely.
    ///
    /// Each handshake runs on its own task, failures are reported to the connect fault observer.
    #[instrument(level = "debug", skip_all)]
    pub async fn accept_loop(&self, listener: impl Accept) {
        loop {
            match listener.accept().await {
                Ok((peer, tx, rx)) => {
                    let srv = self.clone();
                    tokio::spawn(
                        async move {
                            if let Err(err) = srv.establish(peer, tx, rx).await {
                                srv.connect_fault(peer, &err);
                            }
                        }
                        .in_current_span(),
                    );
                }
                Err(err) => self.connect_fault(None, &AcceptError::IO(err)),
            }
        }
    }

    fn connect_fault(&self, peer: Option<SocketAddr>, err: &AcceptError) {
        warn!(?peer, ?err, "failed to establish connection");
        if let Some(observer) = &self.0.on_connect_fault {
            observer(peer, err);
        }
    }

    #[instrument(level = "trace", skip(self, tx, rx))]
    async fn establish(
        &self,
        peer: Option<SocketAddr>,
        tx: impl AsyncWrite + Send + Unpin + 'static,
        mut rx: impl AsyncRead + Send + Unpin + 'static,
    ) -> Result<Accepted, AcceptError> {
        let cipher = self.0.cipher.as_ref();
        let signal = read_i32(&mut rx, cipher).await.map_err(AcceptError::IO)?;
        match signal {
            0 => {
                let id = self
                    .0
                    .next_id
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                        (id < i32::MAX as u32).then_some(id + 1)
                    })
                    .map_err(|_| AcceptError::Exhausted)?;
                let conn = Arc::new(Connection::new(id, peer, cipher.cloned(), tx, rx));
                // registered before the peer learns `id`, so that its callback stream finds it
                self.registry().insert(id, Arc::clone(&conn));
                // `id` is bounded by `i32::MAX`
                if let Err(err) = conn.write_signal(id as i32).await {
                    self.deregister(&conn);
                    return Err(AcceptError::IO(err));
                }
                info!(id, ?peer, "accepted connection");
                let srv = self.clone();
                tokio::spawn(
                    async move {
                        serve(&conn, &srv.0.handlers, srv.0.on_fault.as_ref()).await;
                        srv.deregister(&conn);
                        conn.shutdown().await;
                    }
                    .in_current_span(),
                );
                Ok(Accepted::Primary(id))
            }
            // `n` is positive
            n if n > 0 => {
                let id = n as ConnectionId;
                let primary = self
                    .connection(id)
                    .ok_or(AcceptError::UnknownConnection(id))?;
                if primary.has_callback() {
                    return Err(AcceptError::CallbackAttached(id));
                }
                let callback = Arc::new(Connection::new(id, peer, cipher.cloned(), tx, rx));
                // attached before the echo, so that handlers see it once the peer proceeds
                primary
                    .attach_callback(Invoker::from(Arc::clone(&callback)))
                    .map_err(|_| AcceptError::CallbackAttached(id))?;
                if let Err(err) = callback.write_signal(n).await {
                    callback.close();
                    return Err(AcceptError::IO(err));
                }
                info!(id, ?peer, "attached callback stream");
                Ok(Accepted::Callback(id))
            }
            n => Err(AcceptError::InvalidSignal(n)),
        }
    }

    /// Removes `conn` from the registry, unless it was already replaced or removed
    fn deregister(&self, conn: &Arc<Connection>) {
        let mut registry = self.registry();
        if registry
            .get(&conn.id())
            .is_some_and(|registered| Arc::ptr_eq(registered, conn))
        {
            registry.remove(&conn.id());
            debug!(id = conn.id(), "deregistered connection");
        }
    }
}
