use core::fmt::{self, Display};

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{instrument, trace};

use crate::{Error, Kind, Value};

/// Maximum number of fields in a record, bounded by the one-byte count on the wire
pub const MAX_RECORD_FIELDS: usize = u8::MAX as usize;

/// Named record field
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Field {
    pub name: Arc<str>,
    pub schema: Schema,
}

/// Description of a value's shape.
///
/// Schemas are immutable once constructed and cheap to clone.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Schema {
    /// Primitive value, present unless the kind is always nullable
    Primitive(Kind),
    /// Primitive value preceded by a presence sentinel.
    ///
    /// Construct with [`Schema::nullable`], always nullable kinds are [`Schema::Primitive`].
    Nullable(Kind),
    /// Homogeneous sequence
    Array(Arc<Schema>),
    /// Fixed, ordered set of named fields
    Record(Arc<[Field]>),
}

impl Schema {
    /// Whether values of this schema carry a presence sentinel on the wire
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Primitive(kind) => kind.is_always_nullable(),
            Self::Nullable(..) | Self::Array(..) | Self::Record(..) => true,
        }
    }

    /// Nullable primitive of `kind`.
    ///
    /// Always nullable kinds already carry a presence sentinel, so they map to
    /// [`Schema::Primitive`], which is also what [`read_schema`](crate::read_schema) yields.
    #[must_use]
    pub fn nullable(kind: Kind) -> Self {
        if kind.is_always_nullable() {
            Self::Primitive(kind)
        } else {
            Self::Nullable(kind)
        }
    }

    /// Shortcut for [`Schema::Array`]
    #[must_use]
    pub fn array(element: Schema) -> Self {
        Self::Array(Arc::new(element))
    }

    /// Starts building a record schema
    #[must_use]
    pub fn record() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Record fields, empty for non-record schemas
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        if let Self::Record(fields) = self {
            fields
        } else {
            &[]
        }
    }

    /// Whether a runtime `shape` has a counterpart for everything this schema declares.
    ///
    /// `shape` may carry members this schema does not mention.
    #[must_use]
    pub fn is_compatible(&self, shape: &Shape) -> bool {
        match (self, shape) {
            (Self::Primitive(kind) | Self::Nullable(kind), Shape::Primitive { kind: k, .. }) => {
                kind == k
            }
            (Self::Array(element), Shape::Array(shape)) => element.is_compatible(shape),
            (Self::Record(fields), Shape::Record(members)) => fields.iter().all(|field| {
                members
                    .iter()
                    .any(|(name, shape)| *name == *field.name && field.schema.is_compatible(shape))
            }),
            _ => false,
        }
    }

    /// Verifies that `value` conforms to this schema.
    ///
    /// The whole value is walked, so an error is returned before any of it is encoded.
    pub fn check(&self, value: &Value) -> Result<(), Error> {
        if value.is_null() {
            return if self.is_nullable() {
                Ok(())
            } else {
                Err(Error::NullValue {
                    expected: self.to_string(),
                })
            };
        }
        match (self, value) {
            (Self::Primitive(kind) | Self::Nullable(kind), value) => match value.kind() {
                Some(k) if k == *kind => Ok(()),
                _ => Err(Error::mismatch(self, value.describe())),
            },
            (Self::Array(element), Value::Array(items)) => {
                items.iter().try_for_each(|item| element.check(item))
            }
            (Self::Record(fields), Value::Record(record)) => {
                for field in fields.iter() {
                    match record.get(&field.name) {
                        Some(value) => field.schema.check(value)?,
                        None if field.schema.is_nullable() => {}
                        None => {
                            return Err(Error::mismatch(
                                self,
                                format!("record without field `{}`", field.name),
                            ))
                        }
                    }
                }
                Ok(())
            }
            (_, value) => Err(Error::mismatch(self, value.describe())),
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => Display::fmt(kind, f),
            Self::Nullable(kind) => write!(f, "{kind}?"),
            Self::Array(element) => write!(f, "{element}[]"),
            Self::Record(fields) => {
                f.write_str("{")?;
                for (i, Field { name, schema }) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {schema}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Builds a record schema one field at a time.
///
/// Fields are kept in insertion order, which is the order they are encoded in.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Vec<Field>,
}

impl RecordBuilder {
    /// Appends a field
    #[must_use]
    pub fn field(mut self, name: impl Into<Arc<str>>, schema: Schema) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema,
        });
        self
    }

    /// Finishes the record schema
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaBuild`] if field names repeat or there are too many fields
    pub fn build(self) -> Result<Schema, Error> {
        if self.fields.len() > MAX_RECORD_FIELDS {
            return Err(Error::SchemaBuild(format!(
                "record has {} fields, at most {MAX_RECORD_FIELDS} are supported",
                self.fields.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.fields.len());
        for Field { name, .. } in &self.fields {
            if !seen.insert(name.as_ref()) {
                return Err(Error::SchemaBuild(format!(
                    "duplicate record field `{name}`"
                )));
            }
        }
        Ok(Schema::Record(self.fields.into()))
    }
}

/// Description of a runtime type, from which a [Schema] is built
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Primitive { kind: Kind, nullable: bool },
    Array(Box<Shape>),
    Record(Vec<(String, Shape)>),
    /// Type that maps to no schema category, identified by name
    Opaque(String),
}

impl Shape {
    /// Non-nullable primitive
    #[must_use]
    pub fn primitive(kind: Kind) -> Self {
        Self::Primitive {
            kind,
            nullable: false,
        }
    }

    /// Nullable primitive
    #[must_use]
    pub fn nullable(kind: Kind) -> Self {
        Self::Primitive {
            kind,
            nullable: true,
        }
    }

    #[must_use]
    pub fn array(element: Shape) -> Self {
        Self::Array(Box::new(element))
    }

    /// Returns the shape with its nullability set, a no-op for non-primitive shapes
    #[must_use]
    pub fn into_nullable(self) -> Self {
        match self {
            Self::Primitive { kind, .. } => Self::nullable(kind),
            shape => shape,
        }
    }
}

/// Builds a [Schema] from a shape description
///
/// # Errors
///
/// Returns [`Error::SchemaBuild`] if any part of the shape maps to no schema category
#[instrument(level = "trace", skip_all, ret(level = "trace"))]
pub fn build_schema(shape: &Shape) -> Result<Schema, Error> {
    match shape {
        Shape::Primitive {
            kind,
            nullable: true,
        } => Ok(Schema::nullable(*kind)),
        Shape::Primitive { kind, .. } => Ok(Schema::Primitive(*kind)),
        Shape::Array(element) => build_schema(element).map(Schema::array),
        Shape::Record(members) => {
            let mut builder = Schema::record();
            for (name, shape) in members {
                trace!(name, "building field schema");
                let schema = build_schema(shape).map_err(|err| match err {
                    Error::SchemaBuild(reason) => {
                        Error::SchemaBuild(format!("field `{name}`: {reason}"))
                    }
                    err => err,
                })?;
                builder = builder.field(name.as_str(), schema);
            }
            builder.build()
        }
        Shape::Opaque(name) => Err(Error::SchemaBuild(format!(
            "`{name}` does not map to any known type category"
        ))),
    }
}
