//! Schema-driven remote procedure calls over framed byte streams.
//!
//! [schema] describes and encodes values, [transport] carries method calls encoded with it
//! between a [Client] and a [Server].

pub use wirecall_schema as schema;
pub use wirecall_transport as transport;

pub use schema::{Describe, FromValue, IntoValue, Kind, Record, Schema, Shape, Value};
pub use transport::{
    Client, ClientConfig, Context, Contract, Error, HandlerError, HandlerTable, Invoker, Method,
    Server, ServerConfig,
};
