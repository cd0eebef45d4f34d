//! Conversions between Rust types and [Value]

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{build_schema, Error, Kind, Record, Schema, Shape, Ticks, Value};

/// Types with a statically known [Shape]
pub trait Describe {
    /// Returns the shape of the type
    fn shape() -> Shape;

    /// Builds the schema of the type
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaBuild`] if the shape maps to no schema category
    fn schema() -> Result<Schema, Error> {
        build_schema(&Self::shape())
    }
}

/// Conversion into a [Value]
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Conversion from a [Value]
pub trait FromValue: Sized {
    /// # Errors
    ///
    /// Returns an error if the value has a different shape
    fn from_value(value: Value) -> Result<Self, Error>;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

macro_rules! impl_primitive {
    ($t:ty, $kind:ident) => {
        impl Describe for $t {
            fn shape() -> Shape {
                Shape::primitive(Kind::$kind)
            }
        }

        impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::$kind(self)
            }
        }

        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$kind(v)
            }
        }

        impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self, Error> {
                match value {
                    Value::$kind(v) => Ok(v),
                    Value::Null => Err(Error::NullValue {
                        expected: Kind::$kind.to_string(),
                    }),
                    value => Err(Error::mismatch(Kind::$kind, value.describe())),
                }
            }
        }
    };
}

impl_primitive!(u8, U8);
impl_primitive!(i8, I8);
impl_primitive!(i16, I16);
impl_primitive!(u16, U16);
impl_primitive!(i32, I32);
impl_primitive!(u32, U32);
impl_primitive!(i64, I64);
impl_primitive!(u64, U64);
impl_primitive!(f32, F32);
impl_primitive!(f64, F64);
impl_primitive!(Decimal, Decimal);
impl_primitive!(bool, Bool);
impl_primitive!(String, String);
impl_primitive!(Uuid, Guid);

impl Describe for Ticks {
    fn shape() -> Shape {
        Shape::primitive(Kind::DateTime)
    }
}

impl IntoValue for Ticks {
    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl FromValue for Ticks {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::Null => Err(Error::NullValue {
                expected: Kind::DateTime.to_string(),
            }),
            value => Err(Error::mismatch(Kind::DateTime, value.describe())),
        }
    }
}

impl<T: Describe> Describe for Option<T> {
    fn shape() -> Shape {
        T::shape().into_nullable()
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Err(Error::NullValue {
                expected: "array".into(),
            }),
            value => Err(Error::mismatch("array", value.describe())),
        }
    }
}

impl IntoValue for Record {
    fn into_value(self) -> Value {
        Value::Record(self)
    }
}

impl FromValue for Record {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Record(record) => Ok(record),
            Value::Null => Err(Error::NullValue {
                expected: "record".into(),
            }),
            value => Err(Error::mismatch("record", value.describe())),
        }
    }
}

impl Record {
    /// Removes field `name` and converts it, absent fields are treated as null
    ///
    /// # Errors
    ///
    /// Returns an error if the field value cannot be converted to `T`
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<T, Error> {
        T::from_value(self.remove(name).unwrap_or_default())
    }
}
