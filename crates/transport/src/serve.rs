use core::fmt;
use core::future::Future;
use core::net::SocketAddr;
use core::panic::AssertUnwindSafe;
use core::pin::Pin;

use std::collections::{hash_map, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use futures::FutureExt as _;
use tokio::select;
use tracing::{debug, error, instrument, trace, warn};
use wirecall_schema::Value;

use crate::frame::{receive_request, send_response, Io, Request, Response};
use crate::{
    Connection, ConnectionId, Contract, Error, Fault, FaultObserver, HandlerError, Invoker, Method,
};

/// Future returned by a type-erased handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

type Handler = Arc<dyn Fn(Context, Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Context passed to handlers
#[derive(Clone, Debug)]
pub struct Context {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    callback: Option<Invoker>,
}

impl Context {
    pub(crate) fn new(id: ConnectionId, peer: Option<SocketAddr>, callback: Option<Invoker>) -> Self {
        Self { id, peer, callback }
    }

    /// Identifier of the connection the request arrived on
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Invoker calling back into the peer, if it opened a callback connection
    #[must_use]
    pub fn callback(&self) -> Option<&Invoker> {
        self.callback.as_ref()
    }
}

/// Methods served on a connection together with their handlers
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<Arc<str>, (Method, Handler)>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `method`
    ///
    /// # Errors
    ///
    /// Returns an error if a handler for a method with the same name is already registered
    pub fn register<F, Fut>(&mut self, method: Method, handler: F) -> anyhow::Result<()>
    where
        F: Fn(Context, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        match self.handlers.entry(Arc::clone(method.name_arc())) {
            hash_map::Entry::Occupied(..) => {
                bail!("handler for `{}` already exists", method.name())
            }
            hash_map::Entry::Vacant(entry) => {
                let handler: Handler =
                    Arc::new(move |cx: Context, args: Vec<Value>| -> HandlerFuture {
                        Box::pin(handler(cx, args))
                    });
                entry.insert((method, handler));
                Ok(())
            }
        }
    }

    /// Registers a handler for `method` and returns the table
    ///
    /// # Errors
    ///
    /// Returns an error if a handler for a method with the same name is already registered
    pub fn with<F, Fut>(mut self, method: Method, handler: F) -> anyhow::Result<Self>
    where
        F: Fn(Context, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(method, handler)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Method> {
        self.handlers.get(name).map(|(method, _)| method)
    }

    /// Methods served by this table
    #[must_use]
    pub fn contract(&self) -> Contract {
        self.handlers.values().map(|(method, _)| method.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Outcome of a single served request
pub enum Outcome {
    /// Handler returned a value
    Returned,
    /// Handler failed with an application error, which was sent to the caller
    Application(i32),
    /// Handler failed otherwise, the caller was sent status 2
    Unhandled {
        method: Arc<str>,
        error: anyhow::Error,
    },
    /// Peer closed the stream between requests
    Closed,
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Returned => f.write_str("Returned"),
            Self::Application(code) => write!(f, "Application({code})"),
            Self::Unhandled { method, error } => write!(f, "Unhandled({method}: {error:#})"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Reads one request from `conn`, dispatches it to its handler and writes the response.
///
/// A request for an unregistered method is answered with status 2 and returned as
/// [`Error::UnknownMethod`], the connection cannot be used afterwards.
///
/// # Errors
///
/// Returns an error if the connection faulted or was closed
#[instrument(level = "trace", skip_all, fields(id = conn.id()))]
pub async fn serve_one(conn: &Connection, handlers: &HandlerTable) -> Result<Outcome, Error> {
    let mut io = conn.lock().await?;
    select! {
        res = handle(conn, handlers, &mut io) => res,
        () = conn.closed() => Err(Error::Closed),
    }
}

async fn handle(conn: &Connection, handlers: &HandlerTable, io: &mut Io) -> Result<Outcome, Error> {
    let Io { tx, rx } = io;
    let cipher = conn.cipher();
    debug!("awaiting request");
    let Some(Request { name, args }) = receive_request(rx, cipher).await? else {
        return Ok(Outcome::Closed);
    };
    let Some((method, handler)) = handlers.handlers.get(name.as_str()) else {
        warn!(%name, "request for unknown method");
        send_response(tx, cipher, false, &Response::Unhandled).await?;
        return Err(Error::UnknownMethod(name));
    };
    let unhandled = |error: anyhow::Error| {
        (
            Response::Unhandled,
            Outcome::Unhandled {
                method: Arc::clone(method.name_arc()),
                error,
            },
        )
    };
    trace!(%name, "decoding parameters");
    let (response, outcome) = match method.decode_params(args) {
        Ok(params) => {
            debug!(%name, "calling handler");
            let res = AssertUnwindSafe(handler(conn.context(), params))
                .catch_unwind()
                .await;
            match res {
                Ok(Ok(value)) => {
                    trace!(%name, "encoding result");
                    match method.encode_result(&value) {
                        Ok(payload) => (Response::Ok(payload), Outcome::Returned),
                        Err(err) => unhandled(anyhow!(err).context("failed to encode result")),
                    }
                }
                Ok(Err(HandlerError::Application(code))) => {
                    (Response::Application(code), Outcome::Application(code))
                }
                Ok(Err(HandlerError::Other(err))) => unhandled(err),
                Err(_) => unhandled(anyhow!("handler panicked")),
            }
        }
        Err(err) => unhandled(anyhow!(err).context("failed to decode parameters")),
    };
    debug!(%name, status = ?response.status(), "writing response");
    send_response(tx, cipher, method.returns().is_some(), &response).await?;
    Ok(outcome)
}

/// Serves requests on `conn` until it is closed by either side or faults, then closes it.
///
/// Handler and connection faults are reported to `observer`.
#[instrument(level = "debug", skip_all, fields(id = conn.id()))]
pub async fn serve(conn: &Connection, handlers: &HandlerTable, observer: Option<&FaultObserver>) {
    let report = |fault: Fault| {
        if let Some(observer) = observer {
            observer(conn.id(), &fault);
        }
    };
    loop {
        match serve_one(conn, handlers).await {
            Ok(Outcome::Returned | Outcome::Application(..)) => {}
            Ok(Outcome::Unhandled { method, error }) => {
                error!(?error, %method, "handler failed");
                report(Fault::Handler { method, error });
            }
            Ok(Outcome::Closed) => {
                debug!("peer closed connection");
                break;
            }
            Err(Error::Closed) => {
                debug!("connection closed");
                break;
            }
            Err(err) => {
                warn!(?err, "connection faulted");
                conn.close();
                report(Fault::Connection(err));
                break;
            }
        }
    }
    conn.close();
}
