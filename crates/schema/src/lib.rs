//! Schema-driven binary serialization.
//!
//! A [Schema] describes a value's shape as a small tree of primitives, nullable primitives,
//! arrays and records. Both the schema itself and any [Value] conforming to it can be written to
//! and read back from a byte buffer, so that a peer can reconstruct a remote type's shape without
//! sharing its definition.

mod codec;
mod convert;
mod error;
mod kind;
mod schema;
mod value;

pub use codec::*;
pub use convert::*;
pub use error::Error;
pub use kind::*;
pub use schema::*;
pub use value::*;

pub use rust_decimal::Decimal;
pub use uuid::Uuid;
