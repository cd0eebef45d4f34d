use core::net::SocketAddr;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, Instrument as _};
use wirecall_schema::{FromValue, Value};

use crate::frame::{read_i32, write_i32};
use crate::{
    serve, Cipher, ClientConfig, Connection, ConnectionId, Error, FaultObserver, HandlerTable,
    Invoker, Method,
};

/// Client side of a connection, optionally serving callbacks from the server
pub struct Client {
    invoker: Invoker,
    callback: Option<(Arc<Connection>, JoinHandle<()>)>,
}

impl Drop for Client {
    fn drop(&mut self) {
        self.invoker.connection().close();
        if let Some((conn, _)) = &self.callback {
            conn.close();
        }
    }
}

fn connection_id(v: i32) -> Result<ConnectionId, Error> {
    match ConnectionId::try_from(v) {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::Protocol(format!(
            "server assigned invalid connection id {v}"
        ))),
    }
}

impl Client {
    /// Connects to the server at `addr` over TCP.
    ///
    /// If `config` carries callback handlers, a second stream is opened and served on a spawned
    /// task.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material cannot be loaded or either handshake fails
    #[cfg(feature = "net")]
    #[instrument(level = "trace", skip_all)]
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs + Clone,
        config: &ClientConfig,
    ) -> Result<Self, Error> {
        let cipher = config.cipher().await?;
        let stream = tokio::net::TcpStream::connect(addr.clone()).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let (rx, tx) = stream.into_split();
        let mut client = Self::establish(peer, cipher, tx, rx).await?;
        if let Some(handlers) = &config.callbacks {
            let stream = tokio::net::TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            let (rx, tx) = stream.into_split();
            client
                .attach_callback(tx, rx, handlers.clone(), config.on_fault.clone())
                .await?;
        }
        Ok(client)
    }

    /// Performs the handshake for a new connection on an established stream
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails
    #[instrument(level = "trace", skip(cipher, tx, rx))]
    pub async fn establish(
        peer: Option<SocketAddr>,
        cipher: Option<Cipher>,
        mut tx: impl AsyncWrite + Send + Unpin + 'static,
        mut rx: impl AsyncRead + Send + Unpin + 'static,
    ) -> Result<Self, Error> {
        debug!("requesting connection id");
        write_i32(&mut tx, cipher.as_ref(), 0).await?;
        let id = connection_id(read_i32(&mut rx, cipher.as_ref()).await?)?;
        debug!(id, "connection established");
        let conn = Connection::new(id, peer, cipher, tx, rx);
        Ok(Self {
            invoker: Invoker::from(Arc::new(conn)),
            callback: None,
        })
    }

    /// Performs the callback handshake on a second stream and serves `handlers` on it
    ///
    /// # Errors
    ///
    /// Returns an error if a callback stream is already attached or the handshake fails
    #[instrument(level = "trace", skip_all, fields(id = self.id()))]
    pub async fn attach_callback(
        &mut self,
        mut tx: impl AsyncWrite + Send + Unpin + 'static,
        mut rx: impl AsyncRead + Send + Unpin + 'static,
        handlers: HandlerTable,
        on_fault: Option<FaultObserver>,
    ) -> Result<(), Error> {
        if self.callback.as_ref().is_some_and(|(conn, _)| conn.is_active()) {
            return Err(Error::Protocol(
                "callback stream is already attached".into(),
            ));
        }
        let id = self.id();
        let conn = self.invoker.connection();
        let cipher = conn.cipher().cloned();
        // `id` was received as a positive `i32`
        write_i32(&mut tx, cipher.as_ref(), id as i32).await?;
        let echo = read_i32(&mut rx, cipher.as_ref()).await?;
        if connection_id(echo)? != id {
            return Err(Error::Protocol(format!(
                "callback handshake echoed {echo}, expected {id}"
            )));
        }
        debug!("callback stream established");
        let callback = Arc::new(Connection::new(id, conn.peer(), cipher, tx, rx));
        let task = tokio::spawn({
            let callback = Arc::clone(&callback);
            async move {
                serve(&callback, &handlers, on_fault.as_ref()).await;
                callback.shutdown().await;
            }
            .in_current_span()
        });
        if let Some((prev, _)) = self.callback.replace((callback, task)) {
            prev.close();
        }
        Ok(())
    }

    /// Connection identifier assigned by the server
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.invoker.id()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.invoker.is_active()
    }

    /// Invoker on the primary connection, clones may be moved to other tasks
    #[must_use]
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Invokes `method` on the server, see [`Invoker::invoke`]
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation fails
    pub async fn invoke(&self, method: &Method, args: &[Value]) -> Result<Value, Error> {
        self.invoker.invoke(method, args).await
    }

    /// Invokes `method` on the server and converts the result, see [`Invoker::call`]
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation fails or the result cannot be converted
    pub async fn call<R: FromValue>(&self, method: &Method, args: &[Value]) -> Result<R, Error> {
        self.invoker.call(method, args).await
    }

    /// Closes both streams and waits for the callback task to finish
    #[instrument(level = "trace", skip_all, fields(id = self.id()))]
    pub async fn close(mut self) {
        self.invoker.connection().shutdown().await;
        if let Some((conn, task)) = self.callback.take() {
            conn.shutdown().await;
            if let Err(err) = task.await {
                debug!(?err, "callback task failed");
            }
        }
    }
}
