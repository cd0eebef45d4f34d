//! Framed request/response transport for schema-encoded method calls.
//!
//! A client opens a [Connection] to a [Server] and invokes [Method]s on it through an [Invoker].
//! Every call writes a request frame and blocks the connection until the response frame arrives,
//! so concurrent callers sharing a connection are served one at a time. A client may open a
//! second, callback stream on which the server invokes methods served by the client.

pub mod cipher;
mod config;
mod error;
pub mod frame;
mod invoke;
mod method;
mod serve;

pub use cipher::Cipher;
pub use config::*;
pub use error::*;
pub use frame::{
    AcceptError, Accepted, Client, ConnectFaultObserver, Connection, ConnectionId, Fault,
    FaultObserver, Server, ServerBuilder,
};
pub use invoke::*;
pub use method::*;
pub use serve::*;

pub use wirecall_schema as schema;
