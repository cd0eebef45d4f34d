use std::sync::Arc;

use bytes::{Buf as _, Bytes, BytesMut};
use tracing::{instrument, trace};
use wirecall_schema::{read_value, write_value, Schema, Value};

use crate::frame::name_units;
use crate::Error;

/// Remote method descriptor: name, parameter schemas and optional result schema
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Method {
    name: Arc<str>,
    params: Arc<[Schema]>,
    returns: Option<Schema>,
}

impl Method {
    /// Constructs a new [Method]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the name does not fit into a request head
    pub fn new(
        name: impl Into<Arc<str>>,
        params: impl IntoIterator<Item = Schema>,
        returns: Option<Schema>,
    ) -> Result<Self, Error> {
        let name = name.into();
        name_units(&name)?;
        Ok(Self {
            name,
            params: params.into_iter().collect(),
            returns,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn params(&self) -> &[Schema] {
        &self.params
    }

    /// Result schema, `None` if the method does not return a value
    #[must_use]
    pub fn returns(&self) -> Option<&Schema> {
        self.returns.as_ref()
    }

    /// Encodes arguments in declaration order
    #[instrument(level = "trace", skip_all, fields(method = %self.name))]
    pub fn encode_params(&self, args: &[Value]) -> Result<Bytes, Error> {
        if args.len() != self.params.len() {
            return Err(Error::Codec(wirecall_schema::Error::TypeMismatch {
                expected: format!("{} arguments", self.params.len()),
                found: format!("{} arguments", args.len()),
            }));
        }
        let mut buf = BytesMut::new();
        for (i, (schema, arg)) in self.params.iter().zip(args).enumerate() {
            trace!(i, "encoding parameter");
            write_value(schema, arg, &mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decodes arguments, which must span the whole payload
    #[instrument(level = "trace", skip_all, fields(method = %self.name))]
    pub fn decode_params(&self, mut args: Bytes) -> Result<Vec<Value>, Error> {
        let values = self
            .params
            .iter()
            .map(|schema| read_value(schema, &mut args))
            .collect::<Result<Vec<_>, _>>()?;
        if args.has_remaining() {
            return Err(Error::Codec(wirecall_schema::Error::InvalidData(format!(
                "{} trailing bytes after arguments",
                args.remaining()
            ))));
        }
        Ok(values)
    }

    /// Encodes a handler result, empty if the method does not return a value
    #[instrument(level = "trace", skip_all, fields(method = %self.name))]
    pub fn encode_result(&self, value: &Value) -> Result<Bytes, Error> {
        let Some(schema) = &self.returns else {
            return Ok(Bytes::new());
        };
        let mut buf = BytesMut::new();
        write_value(schema, value, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a result payload, [`Value::Null`] if the method does not return a value
    #[instrument(level = "trace", skip_all, fields(method = %self.name))]
    pub fn decode_result(&self, mut payload: Bytes) -> Result<Value, Error> {
        let Some(schema) = &self.returns else {
            return Ok(Value::Null);
        };
        let value = read_value(schema, &mut payload)?;
        if payload.has_remaining() {
            return Err(Error::Codec(wirecall_schema::Error::InvalidData(format!(
                "{} trailing bytes after result",
                payload.remaining()
            ))));
        }
        Ok(value)
    }
}

/// Ordered set of methods shared by both ends of a connection
#[derive(Clone, Debug, Default)]
pub struct Contract {
    methods: Vec<Method>,
}

impl Contract {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method, replacing a method with the same name
    #[must_use]
    pub fn with(mut self, method: Method) -> Self {
        self.insert(method);
        self
    }

    /// Adds a method and returns the one it replaced
    pub fn insert(&mut self, method: Method) -> Option<Method> {
        if let Some(m) = self.methods.iter_mut().find(|m| m.name == method.name) {
            Some(std::mem::replace(m, method))
        } else {
            self.methods.push(method);
            None
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name() == name)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Method> {
        self.methods.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl FromIterator<Method> for Contract {
    fn from_iter<T: IntoIterator<Item = Method>>(iter: T) -> Self {
        let mut contract = Self::new();
        for method in iter {
            contract.insert(method);
        }
        contract
    }
}
