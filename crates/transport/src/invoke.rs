use std::sync::Arc;

use tracing::{instrument, trace};
use wirecall_schema::{FromValue, Value};

use crate::{Connection, ConnectionId, Error, Method};

/// Client-side handle issuing calls over a [Connection].
///
/// Clones share the connection, concurrent calls are serialized on it.
#[derive(Clone, Debug)]
pub struct Invoker {
    conn: Arc<Connection>,
}

impl From<Arc<Connection>> for Invoker {
    fn from(conn: Arc<Connection>) -> Self {
        Self { conn }
    }
}

impl Invoker {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.conn.is_active()
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Invokes `method` with `args` and waits for the result.
    ///
    /// Returns [`Value::Null`] for methods without a result. Dropping the returned future once the
    /// request was sent, e.g. on a timeout, closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteApplication`] or [`Error::RemoteUnhandled`] if the remote handler
    /// failed, [`Error::Codec`] if the arguments do not match the method's parameters or the
    /// result could not be decoded, and a connection-level error otherwise, after which the
    /// connection is closed.
    #[instrument(level = "trace", skip(self, method, args), fields(id = self.conn.id(), method = method.name()))]
    pub async fn invoke(&self, method: &Method, args: &[Value]) -> Result<Value, Error> {
        trace!("encoding parameters");
        let params = method.encode_params(args)?;
        let payload = self
            .conn
            .round_trip(method.name(), method.returns().is_some(), &params)
            .await?;
        trace!(len = payload.len(), "decoding result");
        method.decode_result(payload)
    }

    /// Invokes `method` and converts the result to `R`
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Invoker::invoke`] and [`Error::Codec`] if the result cannot be
    /// converted
    pub async fn call<R: FromValue>(&self, method: &Method, args: &[Value]) -> Result<R, Error> {
        let value = self.invoke(method, args).await?;
        Ok(R::from_value(value)?)
    }
}
