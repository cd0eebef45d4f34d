use core::time::Duration;

use std::sync::Arc;
use std::time::SystemTime;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::Kind;

/// Point in time as a count of 100-nanosecond ticks since 0001-01-01T00:00:00
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticks(pub i64);

impl Ticks {
    /// Ticks between 0001-01-01 and the Unix epoch
    pub const UNIX_EPOCH: Self = Self(621_355_968_000_000_000);

    /// Ticks per second
    pub const PER_SECOND: i64 = 10_000_000;

    /// Converts to [SystemTime], `None` if the instant is not representable
    #[must_use]
    pub fn to_system_time(self) -> Option<SystemTime> {
        let delta = self.0.checked_sub(Self::UNIX_EPOCH.0)?;
        let secs = delta.div_euclid(Self::PER_SECOND);
        let nanos = delta.rem_euclid(Self::PER_SECOND) * 100;
        let nanos = u32::try_from(nanos).ok()?;
        if secs >= 0 {
            let secs = u64::try_from(secs).ok()?;
            SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
        } else {
            let secs = u64::try_from(secs.checked_neg()?).ok()?;
            SystemTime::UNIX_EPOCH
                .checked_sub(Duration::from_secs(secs))?
                .checked_add(Duration::from_nanos(nanos.into()))
        }
    }

    /// Converts from [SystemTime], `None` if the instant does not fit into 64-bit ticks
    #[must_use]
    pub fn from_system_time(t: SystemTime) -> Option<Self> {
        let ticks = |d: Duration| -> Option<i64> {
            let secs = i64::try_from(d.as_secs()).ok()?;
            secs.checked_mul(Self::PER_SECOND)?
                .checked_add(i64::from(d.subsec_nanos() / 100))
        };
        match t.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => Self::UNIX_EPOCH.0.checked_add(ticks(d)?).map(Self),
            Err(err) => Self::UNIX_EPOCH
                .0
                .checked_sub(ticks(err.duration())?)
                .map(Self),
        }
    }
}

/// Composite value with named fields.
///
/// Field lookup is by name, so a record may carry fields its schema does not declare.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(Arc<str>, Value)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, replacing an existing field with the same name
    #[must_use]
    pub fn with(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a field, replacing an existing field with the same name
    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some((_, v)) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            *v = value;
        } else {
            self.fields.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n.as_ref() == name).then_some(v))
    }

    /// Removes a field by name
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let i = self.fields.iter().position(|(n, _)| n.as_ref() == name)?;
        Some(self.fields.remove(i).1)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_ref(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<Arc<str>>> FromIterator<(N, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (N, Value)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// Dynamically-shaped value, encoded and decoded against a [Schema](crate::Schema)
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    String(String),
    DateTime(Ticks),
    Guid(Uuid),
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Primitive kind of the value, `None` for null, arrays and records
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Self::U8(..) => Some(Kind::U8),
            Self::I8(..) => Some(Kind::I8),
            Self::I16(..) => Some(Kind::I16),
            Self::U16(..) => Some(Kind::U16),
            Self::I32(..) => Some(Kind::I32),
            Self::U32(..) => Some(Kind::U32),
            Self::I64(..) => Some(Kind::I64),
            Self::U64(..) => Some(Kind::U64),
            Self::F32(..) => Some(Kind::F32),
            Self::F64(..) => Some(Kind::F64),
            Self::Decimal(..) => Some(Kind::Decimal),
            Self::Bool(..) => Some(Kind::Bool),
            Self::Char(..) => Some(Kind::Char),
            Self::String(..) => Some(Kind::String),
            Self::DateTime(..) => Some(Kind::DateTime),
            Self::Guid(..) => Some(Kind::Guid),
            Self::Null | Self::Array(..) | Self::Record(..) => None,
        }
    }

    /// Short description used in error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Array(..) => "array".into(),
            Self::Record(..) => "record".into(),
            v => v.kind().map(|kind| kind.to_string()).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        if let Self::Record(record) = self {
            Some(record)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Self::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Ticks> for Value {
    fn from(ticks: Ticks) -> Self {
        Self::DateTime(ticks)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}
