use core::fmt::{self, Debug, Display};
use core::net::SocketAddr;
use core::sync::atomic::{AtomicBool, Ordering};

use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio::select;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::frame::{receive_response, send_request, write_i32};
use crate::{Cipher, Context, Error, Invoker};

mod accept;
mod client;
mod server;

pub use accept::*;
pub use client::*;
pub use server::*;

/// Connection identifier assigned by the server during the handshake, starting at 1
pub type ConnectionId = u32;

/// Observer notified of faults on established connections
pub type FaultObserver = Arc<dyn Fn(ConnectionId, &Fault) + Send + Sync>;

/// Fault reported to a [FaultObserver]
pub enum Fault {
    /// Handler failed with a non-application error, the caller was sent status 2
    Handler {
        method: Arc<str>,
        error: anyhow::Error,
    },
    /// Connection faulted and was closed
    Connection(Error),
}

impl Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler { method, error } => write!(f, "handler for `{method}` failed: {error:?}"),
            Self::Connection(err) => write!(f, "connection faulted: {err:?}"),
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler { method, error } => write!(f, "handler for `{method}` failed: {error}"),
            Self::Connection(err) => write!(f, "connection faulted: {err}"),
        }
    }
}

pub(crate) struct Io {
    pub tx: Box<dyn AsyncWrite + Send + Unpin>,
    pub rx: Box<dyn AsyncRead + Send + Unpin>,
}

/// Bidirectional stream shared by the tasks invoking or serving on it.
///
/// Each request/response exchange holds the stream exclusively, so frames of concurrent callers
/// never interleave.
pub struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    cipher: Option<Cipher>,
    io: Mutex<Io>,
    active: AtomicBool,
    closed: CancellationToken,
    callback: std::sync::Mutex<Option<Invoker>>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("encrypted", &self.cipher.is_some())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        cipher: Option<Cipher>,
        tx: impl AsyncWrite + Send + Unpin + 'static,
        rx: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id,
            peer,
            cipher,
            io: Mutex::new(Io {
                tx: Box::new(tx),
                rx: Box::new(rx),
            }),
            active: AtomicBool::new(true),
            closed: CancellationToken::new(),
            callback: std::sync::Mutex::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[must_use]
    pub fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_ref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks the connection inactive and interrupts any task blocked on it, along with the
    /// attached callback connection.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        self.closed.cancel();
        if let Some(callback) = self.callback() {
            callback.connection().close();
        }
        was_active
    }

    /// Closes the connection and shuts down the outgoing halves of its streams
    #[instrument(level = "trace", skip_all, fields(id = self.id))]
    pub async fn shutdown(&self) {
        self.close();
        self.shutdown_stream().await;
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback.connection().shutdown_stream().await;
        }
    }

    async fn shutdown_stream(&self) {
        if let Err(err) = self.io.lock().await.tx.shutdown().await {
            debug!(?err, "failed to shut down stream");
        }
    }

    /// Completes once the connection is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Invoker on the callback connection opened by the peer, if any
    #[must_use]
    pub fn callback(&self) -> Option<Invoker> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attaches a callback connection, returning it back if one is already attached
    pub(crate) fn attach_callback(&self, invoker: Invoker) -> Result<(), Invoker> {
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if callback.as_ref().is_some_and(Invoker::is_active) {
            return Err(invoker);
        }
        *callback = Some(invoker);
        Ok(())
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback().is_some_and(|callback| callback.is_active())
    }

    /// Writes a handshake field
    pub(crate) async fn write_signal(&self, v: i32) -> std::io::Result<()> {
        write_i32(&mut self.io.lock().await.tx, self.cipher.as_ref(), v).await
    }

    /// Handler context for requests served on this connection
    pub(crate) fn context(&self) -> Context {
        Context::new(self.id, self.peer, self.callback())
    }

    /// Acquires exclusive use of the stream
    pub(crate) async fn lock(&self) -> Result<MutexGuard<'_, Io>, Error> {
        if !self.is_active() {
            return Err(Error::Closed);
        }
        let io = self.io.lock().await;
        if !self.is_active() {
            return Err(Error::Closed);
        }
        Ok(io)
    }

    /// Sends a request and waits for its response while holding the stream.
    ///
    /// Connection-level failures close the connection. So does dropping the returned future
    /// before the response is read, since the stream may then be left mid-frame.
    #[instrument(level = "trace", skip(self, args), fields(id = self.id))]
    pub(crate) async fn round_trip(
        &self,
        name: &str,
        returns: bool,
        args: &[u8],
    ) -> Result<Bytes, Error> {
        let mut io = self.lock().await?;
        let mut exchange = Exchange::new(self);
        let Io { tx, rx } = &mut *io;
        let cipher = self.cipher.as_ref();
        let res = select! {
            res = async {
                debug!("writing request");
                send_request(tx, cipher, name, args).await?;
                debug!("awaiting response");
                receive_response(rx, cipher, returns).await
            } => res,
            () = self.closed.cancelled() => Err(Error::Closed),
        };
        exchange.finish();
        drop(io);
        if let Err(err) = &res {
            if err.is_fatal() && self.close() {
                warn!(?err, "connection faulted");
            }
        }
        res
    }
}

/// In-flight exchange on a [Connection], closing it when dropped unfinished
struct Exchange<'a> {
    conn: &'a Connection,
    finished: bool,
}

impl<'a> Exchange<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.finished && self.conn.close() {
            warn!(id = self.conn.id, "exchange abandoned, closing connection");
        }
    }
}
