//! Binary encoding of schemas and of values conforming to a schema.
//!
//! All numbers are fixed-width little-endian. Nullable values are preceded by a one-byte
//! presence sentinel, `0` for absent and `1` for present. Record values carry no field names,
//! names only appear in the schema encoding.

use core::iter::zip;

use bytes::{Buf, BufMut, BytesMut};
use rust_decimal::Decimal;
use tracing::{instrument, trace};
use uuid::Uuid;

use crate::{Error, Field, Kind, Schema, Ticks, Value, ARRAY_TAG, NULLABLE_BIT, RECORD_TAG};

/// Maximum number of array and record levels accepted by [read_schema]
pub const MAX_SCHEMA_DEPTH: usize = 64;

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

const DECIMAL_SIGN_MASK: u32 = 0x8000_0000;
const DECIMAL_SCALE_MASK: u32 = 0x00FF_0000;
const DECIMAL_MAX_SCALE: u32 = 28;

fn ensure_remaining(src: &impl Buf, needed: usize) -> Result<(), Error> {
    let remaining = src.remaining();
    if remaining < needed {
        return Err(Error::Truncated { needed, remaining });
    }
    Ok(())
}

fn get_u8(src: &mut impl Buf) -> Result<u8, Error> {
    ensure_remaining(src, 1)?;
    Ok(src.get_u8())
}

fn get_flag(src: &mut impl Buf, what: &str) -> Result<bool, Error> {
    match get_u8(src)? {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(Error::InvalidData(format!("{what} byte must be 0 or 1, got {b}"))),
    }
}

fn get_len(src: &mut impl Buf, what: &str) -> Result<usize, Error> {
    ensure_remaining(src, 4)?;
    let n = src.get_i32_le();
    usize::try_from(n).map_err(|_| Error::InvalidData(format!("negative {what} length {n}")))
}

fn put_len(dst: &mut impl BufMut, n: usize, what: &str) -> Result<(), Error> {
    let n = i32::try_from(n)
        .map_err(|_| Error::InvalidData(format!("{what} length {n} does not fit in 32 bits")))?;
    dst.put_i32_le(n);
    Ok(())
}

/// Writes `s` as a 32-bit count of UTF-16 code units followed by the code units
pub fn put_utf16(dst: &mut impl BufMut, s: &str) -> Result<(), Error> {
    let units: Vec<u16> = s.encode_utf16().collect();
    put_len(dst, units.len(), "string")?;
    for unit in units {
        dst.put_u16_le(unit);
    }
    Ok(())
}

/// Reads a string written by [put_utf16]
pub fn get_utf16(src: &mut impl Buf) -> Result<String, Error> {
    let n = get_len(src, "string")?;
    ensure_remaining(src, n.saturating_mul(2))?;
    let units: Vec<u16> = (0..n).map(|_| src.get_u16_le()).collect();
    String::from_utf16(&units).map_err(|err| Error::InvalidData(err.to_string()))
}

/// Writes the schema discriminant and any nested schemas.
///
/// # Errors
///
/// Returns [`Error::SchemaBuild`] if `schema` could not be read back as written, which is the case
/// for [`Schema::Nullable`] of an always nullable kind and for nesting deeper than
/// [`MAX_SCHEMA_DEPTH`]
#[instrument(level = "trace", skip(dst))]
pub fn write_schema(schema: &Schema, dst: &mut impl BufMut) -> Result<(), Error> {
    write_nested_schema(schema, dst, 0)
}

fn write_nested_schema(schema: &Schema, dst: &mut impl BufMut, depth: usize) -> Result<(), Error> {
    match schema {
        Schema::Primitive(kind) => dst.put_u8(kind.tag()),
        Schema::Nullable(kind) if kind.is_always_nullable() => {
            return Err(Error::SchemaBuild(format!(
                "`{kind}` is always nullable, use `Schema::nullable`"
            )))
        }
        Schema::Nullable(kind) => dst.put_u8(kind.tag() | NULLABLE_BIT),
        Schema::Array(..) | Schema::Record(..) if depth >= MAX_SCHEMA_DEPTH => {
            return Err(Error::SchemaBuild(format!(
                "schema nesting exceeds {MAX_SCHEMA_DEPTH} levels"
            )))
        }
        Schema::Array(element) => {
            dst.put_u8(ARRAY_TAG);
            write_nested_schema(element, dst, depth + 1)?;
        }
        Schema::Record(fields) => {
            let n = u8::try_from(fields.len()).map_err(|_| {
                Error::SchemaBuild(format!("record has {} fields", fields.len()))
            })?;
            dst.put_u8(RECORD_TAG);
            dst.put_u8(n);
            for Field { name, schema } in fields.iter() {
                put_utf16(dst, name)?;
                write_nested_schema(schema, dst, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Reads a schema written by [write_schema].
///
/// Arrays and records nest at most [`MAX_SCHEMA_DEPTH`] levels deep.
#[instrument(level = "trace", skip_all, ret(level = "trace"))]
pub fn read_schema(src: &mut impl Buf) -> Result<Schema, Error> {
    read_nested_schema(src, 0)
}

fn read_nested_schema(src: &mut impl Buf, depth: usize) -> Result<Schema, Error> {
    let tag = get_u8(src)?;
    if matches!(tag, ARRAY_TAG | RECORD_TAG) && depth >= MAX_SCHEMA_DEPTH {
        return Err(Error::InvalidData(format!(
            "schema nesting exceeds {MAX_SCHEMA_DEPTH} levels"
        )));
    }
    match tag {
        ARRAY_TAG => read_nested_schema(src, depth + 1).map(Schema::array),
        RECORD_TAG => {
            let n = get_u8(src)?;
            trace!(n, depth, "reading record fields");
            let mut builder = Schema::record();
            for _ in 0..n {
                let name = get_utf16(src)?;
                let schema = read_nested_schema(src, depth + 1)?;
                builder = builder.field(name, schema);
            }
            builder.build()
        }
        tag if tag & NULLABLE_BIT != 0 => match Kind::from_tag(tag & !NULLABLE_BIT) {
            Some(kind) if !kind.is_always_nullable() => Ok(Schema::Nullable(kind)),
            _ => Err(Error::UnknownDiscriminant(tag)),
        },
        tag => Kind::from_tag(tag)
            .map(Schema::Primitive)
            .ok_or(Error::UnknownDiscriminant(tag)),
    }
}

fn put_primitive(dst: &mut impl BufMut, value: &Value) -> Result<(), Error> {
    match value {
        Value::U8(v) => dst.put_u8(*v),
        Value::I8(v) => dst.put_i8(*v),
        Value::I16(v) => dst.put_i16_le(*v),
        Value::U16(v) => dst.put_u16_le(*v),
        Value::I32(v) => dst.put_i32_le(*v),
        Value::U32(v) => dst.put_u32_le(*v),
        Value::I64(v) => dst.put_i64_le(*v),
        Value::U64(v) => dst.put_u64_le(*v),
        Value::F32(v) => dst.put_f32_le(*v),
        Value::F64(v) => dst.put_f64_le(*v),
        Value::Decimal(v) => {
            let b = v.serialize();
            // `serialize` orders the words as flags, lo, mid, hi
            dst.put_slice(&b[4..16]);
            dst.put_slice(&b[0..4]);
        }
        Value::Bool(v) => dst.put_u8((*v).into()),
        Value::Char(v) => dst.put_u16_le(*v),
        Value::String(v) => put_utf16(dst, v)?,
        Value::DateTime(Ticks(v)) => dst.put_i64_le(*v),
        Value::Guid(v) => dst.put_slice(&v.to_bytes_le()),
        value => return Err(Error::mismatch("primitive", value.describe())),
    }
    Ok(())
}

fn get_primitive(src: &mut impl Buf, kind: Kind) -> Result<Value, Error> {
    if let Some(n) = kind.width() {
        ensure_remaining(src, n)?;
    }
    let value = match kind {
        Kind::U8 => Value::U8(src.get_u8()),
        Kind::I8 => Value::I8(src.get_i8()),
        Kind::I16 => Value::I16(src.get_i16_le()),
        Kind::U16 => Value::U16(src.get_u16_le()),
        Kind::I32 => Value::I32(src.get_i32_le()),
        Kind::U32 => Value::U32(src.get_u32_le()),
        Kind::I64 => Value::I64(src.get_i64_le()),
        Kind::U64 => Value::U64(src.get_u64_le()),
        Kind::F32 => Value::F32(src.get_f32_le()),
        Kind::F64 => Value::F64(src.get_f64_le()),
        Kind::Decimal => {
            let mut b = [0; 16];
            src.copy_to_slice(&mut b[4..16]);
            src.copy_to_slice(&mut b[0..4]);
            let flags = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if flags & !(DECIMAL_SIGN_MASK | DECIMAL_SCALE_MASK) != 0
                || (flags & DECIMAL_SCALE_MASK) >> 16 > DECIMAL_MAX_SCALE
            {
                return Err(Error::InvalidData(format!(
                    "invalid decimal flags {flags:#010x}"
                )));
            }
            Value::Decimal(Decimal::deserialize(b))
        }
        Kind::Bool => Value::Bool(get_flag(src, "bool")?),
        Kind::Char => Value::Char(src.get_u16_le()),
        Kind::String => Value::String(get_utf16(src)?),
        Kind::DateTime => Value::DateTime(Ticks(src.get_i64_le())),
        Kind::Guid => {
            let mut b = [0; 16];
            src.copy_to_slice(&mut b);
            Value::Guid(Uuid::from_bytes_le(b))
        }
    };
    Ok(value)
}

fn put_value(schema: &Schema, value: &Value, dst: &mut impl BufMut) -> Result<(), Error> {
    if schema.is_nullable() {
        if value.is_null() {
            dst.put_u8(ABSENT);
            return Ok(());
        }
        dst.put_u8(PRESENT);
    }
    match (schema, value) {
        (Schema::Primitive(..) | Schema::Nullable(..), value) => put_primitive(dst, value),
        (Schema::Array(element), Value::Array(items)) => {
            put_len(dst, items.len(), "array")?;
            items
                .iter()
                .try_for_each(|item| put_value(element, item, dst))
        }
        (Schema::Record(fields), Value::Record(record)) => {
            for Field { name, schema } in fields.iter() {
                put_value(schema, record.get(name).unwrap_or(&Value::Null), dst)?;
            }
            Ok(())
        }
        (schema, value) => Err(Error::mismatch(schema, value.describe())),
    }
}

/// Writes `value` conforming to `schema`.
///
/// The value is checked against the schema first, nothing is written to `dst` on error.
#[instrument(level = "trace", skip(value, dst))]
pub fn write_value(schema: &Schema, value: &Value, dst: &mut BytesMut) -> Result<(), Error> {
    schema.check(value)?;
    let mut buf = BytesMut::new();
    put_value(schema, value, &mut buf)?;
    trace!(len = buf.len(), "encoded value");
    dst.extend_from_slice(&buf);
    Ok(())
}

/// Reads a value conforming to `schema`
#[instrument(level = "trace", skip(src))]
pub fn read_value(schema: &Schema, src: &mut impl Buf) -> Result<Value, Error> {
    if schema.is_nullable() && !get_flag(src, "presence sentinel")? {
        return Ok(Value::Null);
    }
    match schema {
        Schema::Primitive(kind) | Schema::Nullable(kind) => get_primitive(src, *kind),
        Schema::Array(element) => {
            let n = get_len(src, "array")?;
            trace!(n, "reading array elements");
            // each element takes at least a byte, do not trust `n` for the allocation
            let mut items = Vec::with_capacity(n.min(src.remaining()));
            for _ in 0..n {
                items.push(read_value(element, src)?);
            }
            Ok(Value::Array(items))
        }
        Schema::Record(fields) => {
            let mut values = Vec::with_capacity(fields.len());
            for Field { schema, .. } in fields.iter() {
                values.push(read_value(schema, src)?);
            }
            Ok(Value::Record(
                zip(fields.iter(), values)
                    .map(|(Field { name, .. }, value)| (name.clone(), value))
                    .collect(),
            ))
        }
    }
}

/// Writes the schema preamble followed by `value`, so that a reader does not need to know the shape
pub fn write_described(schema: &Schema, value: &Value, dst: &mut BytesMut) -> Result<(), Error> {
    schema.check(value)?;
    write_schema(schema, dst)?;
    write_value(schema, value, dst)
}

/// Reads a schema preamble and the value that follows it
pub fn read_described(src: &mut impl Buf) -> Result<(Schema, Value), Error> {
    let schema = read_schema(src)?;
    let value = read_value(&schema, src)?;
    Ok((schema, value))
}

/// [Encoder](tokio_util::codec::Encoder) for values of a particular schema
#[derive(Clone, Copy, Debug)]
pub struct ValueEncoder<'a> {
    pub schema: &'a Schema,
}

impl<'a> ValueEncoder<'a> {
    #[must_use]
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }
}

impl tokio_util::codec::Encoder<&Value> for ValueEncoder<'_> {
    type Error = Error;

    fn encode(&mut self, value: &Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_value(self.schema, value, dst)
    }
}

/// [Decoder](tokio_util::codec::Decoder) for values of a particular schema
#[derive(Clone, Debug)]
pub struct ValueDecoder {
    schema: Schema,
}

impl ValueDecoder {
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl tokio_util::codec::Decoder for ValueDecoder {
    type Item = Value;
    type Error = Error;

    #[instrument(level = "trace", skip_all)]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut buf = &src[..];
        match read_value(&self.schema, &mut buf) {
            Ok(value) => {
                let n = src.len() - buf.len();
                src.advance(n);
                Ok(Some(value))
            }
            Err(Error::Truncated { needed, .. }) => {
                trace!(needed, "value incomplete");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// [Decoder](tokio_util::codec::Decoder) for schemas
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaDecoder;

impl tokio_util::codec::Decoder for SchemaDecoder {
    type Item = Schema;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut buf = &src[..];
        match read_schema(&mut buf) {
            Ok(schema) => {
                let n = src.len() - buf.len();
                src.advance(n);
                Ok(Some(schema))
            }
            Err(Error::Truncated { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr as _;

    use futures::TryStreamExt as _;
    use tokio_util::codec::{Decoder as _, Encoder as _, FramedRead};

    use super::*;
    use crate::Record;

    fn samples(kind: Kind) -> Vec<Value> {
        match kind {
            Kind::U8 => vec![Value::U8(0), Value::U8(u8::MAX)],
            Kind::I8 => vec![Value::I8(i8::MIN), Value::I8(-1), Value::I8(i8::MAX)],
            Kind::I16 => vec![Value::I16(i16::MIN), Value::I16(0x1234)],
            Kind::U16 => vec![Value::U16(0), Value::U16(u16::MAX)],
            Kind::I32 => vec![Value::I32(i32::MIN), Value::I32(-42), Value::I32(i32::MAX)],
            Kind::U32 => vec![Value::U32(0), Value::U32(u32::MAX)],
            Kind::I64 => vec![Value::I64(i64::MIN), Value::I64(i64::MAX)],
            Kind::U64 => vec![Value::U64(0), Value::U64(u64::MAX)],
            Kind::F32 => vec![Value::F32(-0.5), Value::F32(f32::MAX)],
            Kind::F64 => vec![Value::F64(core::f64::consts::PI), Value::F64(f64::MIN)],
            Kind::Decimal => vec![
                Value::Decimal(Decimal::ZERO),
                Value::Decimal(Decimal::from_str("-79228162514264337593543950335").unwrap()),
                Value::Decimal(Decimal::from_str("12345.6789").unwrap()),
            ],
            Kind::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Kind::Char => vec![Value::Char(u16::from(b'J')), Value::Char(0xD800)],
            Kind::String => vec![
                Value::String(String::new()),
                Value::String("Иосиф Кобзон 𐍈".into()),
            ],
            Kind::DateTime => vec![Value::DateTime(Ticks(0)), Value::DateTime(Ticks::UNIX_EPOCH)],
            Kind::Guid => vec![Value::Guid(
                Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap(),
            )],
        }
    }

    fn roundtrip(schema: &Schema, value: &Value) {
        let mut buf = BytesMut::new();
        write_value(schema, value, &mut buf).expect("failed to write value");
        let mut src = buf.freeze();
        let decoded = read_value(schema, &mut src).expect("failed to read value");
        assert_eq!(&decoded, value, "{schema}");
        assert!(src.is_empty(), "{schema}: trailing bytes");
    }

    fn all_kinds_record() -> Schema {
        let mut builder = Schema::record();
        for kind in Kind::ALL {
            builder = builder.field(kind.name(), Schema::Primitive(kind));
            if !kind.is_always_nullable() {
                builder = builder.field(format!("{}?", kind.name()), Schema::Nullable(kind));
            }
            builder = builder.field(
                format!("{}[]", kind.name()),
                Schema::array(Schema::Primitive(kind)),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn primitives() {
        for kind in Kind::ALL {
            for value in samples(kind) {
                roundtrip(&Schema::Primitive(kind), &value);
                roundtrip(&Schema::Nullable(kind), &value);
            }
            roundtrip(&Schema::Nullable(kind), &Value::Null);
            roundtrip(&Schema::array(Schema::Primitive(kind)), &Value::Array(samples(kind)));
            roundtrip(&Schema::array(Schema::Primitive(kind)), &Value::Array(vec![]));
            roundtrip(&Schema::array(Schema::Primitive(kind)), &Value::Null);
            let mut nullable = samples(kind);
            nullable.insert(1, Value::Null);
            roundtrip(&Schema::array(Schema::Nullable(kind)), &Value::Array(nullable));
        }
    }

    #[test]
    fn nested_records() {
        let inner = all_kinds_record();
        let mut record = Record::new();
        for Field { name, schema } in inner.fields() {
            let value = match schema {
                Schema::Primitive(kind) => samples(*kind).pop().unwrap(),
                Schema::Nullable(..) => Value::Null,
                Schema::Array(element) => match element.as_ref() {
                    Schema::Primitive(kind) => Value::Array(samples(*kind)),
                    _ => unreachable!(),
                },
                Schema::Record(..) => unreachable!(),
            };
            record.insert(name.clone(), value);
        }
        let outer = Schema::record()
            .field("Inner", inner.clone())
            .field("Items", Schema::array(inner.clone()))
            .field("Missing", inner)
            .build()
            .unwrap();
        let value = Value::Record(
            Record::new()
                .with("Inner", record.clone())
                .with(
                    "Items",
                    Value::Array(vec![Value::Record(record.clone()), Value::Null]),
                )
                .with("Missing", Value::Null),
        );
        roundtrip(&outer, &value);
    }

    #[test]
    fn wire_layout() {
        let schema = Schema::record()
            .field("Id", Schema::Nullable(Kind::I32))
            .field("Name", Schema::Primitive(Kind::String))
            .build()
            .unwrap();
        let mut buf = BytesMut::new();
        write_schema(&schema, &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            [
                17, 2, //
                2, 0, 0, 0, b'I', 0, b'd', 0, 0x85, //
                4, 0, 0, 0, b'N', 0, b'a', 0, b'm', 0, b'e', 0, 14,
            ]
        );

        let mut buf = BytesMut::new();
        write_value(
            &schema,
            &Value::Record(Record::new().with("Id", Value::I32(100)).with("Name", "Jo")),
            &mut buf,
        )
        .unwrap();
        assert_eq!(
            buf.as_ref(),
            [1, 1, 100, 0, 0, 0, 1, 2, 0, 0, 0, b'J', 0, b'o', 0]
        );

        let mut buf = BytesMut::new();
        write_value(&Schema::Primitive(Kind::I32), &Value::I32(-2), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), [0xfe, 0xff, 0xff, 0xff]);

        let mut buf = BytesMut::new();
        let d = Decimal::from_str("-1.5").unwrap();
        write_value(&Schema::Primitive(Kind::Decimal), &Value::Decimal(d), &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            [15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0x80]
        );
    }

    #[test]
    fn schemas() {
        let schemas = [
            Schema::Primitive(Kind::Guid),
            Schema::Nullable(Kind::DateTime),
            Schema::array(Schema::array(Schema::Nullable(Kind::F64))),
            all_kinds_record(),
            Schema::record()
                .field("Nested", all_kinds_record())
                .field("List", Schema::array(all_kinds_record()))
                .build()
                .unwrap(),
            Schema::record().build().unwrap(),
        ];
        for schema in schemas {
            let mut buf = BytesMut::new();
            write_schema(&schema, &mut buf).unwrap();
            let mut src = buf.freeze();
            assert_eq!(read_schema(&mut src).unwrap(), schema);
            assert!(src.is_empty());
        }
    }

    #[test]
    fn unknown_discriminant() {
        for tag in [0, 19, 0x80 | 14, 0x80 | 16, 0xff] {
            let res = read_schema(&mut [tag].as_slice());
            assert!(
                matches!(res, Err(Error::UnknownDiscriminant(t)) if t == tag),
                "{tag}: {res:?}"
            );
            assert!(res.unwrap_err().is_schema_decode());
        }
        let res = read_schema(&mut [16, 16, 42].as_slice());
        assert!(matches!(res, Err(Error::UnknownDiscriminant(42))), "{res:?}");
    }

    #[test]
    fn nesting_limit() {
        let mut deep = vec![ARRAY_TAG; 1_000_000];
        deep.push(Kind::I32.tag());
        let res = read_schema(&mut deep.as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let res = SchemaDecoder.decode(&mut BytesMut::from(deep.as_slice()));
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let mut record = vec![RECORD_TAG, 1, 1, 0, 0, 0, b'x', 0];
        record.extend(&deep);
        let res = read_described(&mut record.as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let mut schema = Schema::Primitive(Kind::I32);
        for _ in 0..MAX_SCHEMA_DEPTH {
            schema = Schema::array(schema);
        }
        let mut buf = BytesMut::new();
        write_schema(&schema, &mut buf).unwrap();
        assert_eq!(read_schema(&mut buf.clone().freeze()).unwrap(), schema);

        let schema = Schema::array(schema);
        let mut buf = BytesMut::new();
        let res = write_schema(&schema, &mut buf);
        assert!(matches!(res, Err(Error::SchemaBuild(..))), "{res:?}");
        let mut wire = vec![ARRAY_TAG; MAX_SCHEMA_DEPTH + 1];
        wire.push(Kind::I32.tag());
        let res = read_schema(&mut wire.as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");
    }

    #[test]
    fn always_nullable_kinds() {
        for kind in Kind::ALL {
            let schema = Schema::nullable(kind);
            let mut buf = BytesMut::new();
            write_schema(&schema, &mut buf).unwrap();
            assert_eq!(read_schema(&mut buf.freeze()).unwrap(), schema, "{kind}");
        }

        let mut buf = BytesMut::new();
        let res = write_schema(&Schema::Nullable(Kind::String), &mut buf);
        assert!(matches!(res, Err(Error::SchemaBuild(..))), "{res:?}");
        let res = write_schema(
            &Schema::record()
                .field("Name", Schema::Nullable(Kind::String))
                .build()
                .unwrap(),
            &mut buf,
        );
        assert!(matches!(res, Err(Error::SchemaBuild(..))), "{res:?}");
    }

    #[test]
    fn truncated() {
        let res = read_schema(&mut [17, 1, 2, 0, 0, 0, b'I'].as_slice());
        assert!(matches!(res, Err(Error::Truncated { .. })), "{res:?}");

        let res = read_value(&Schema::Primitive(Kind::I64), &mut [1, 2, 3].as_slice());
        assert!(
            matches!(res, Err(Error::Truncated { needed: 8, remaining: 3 })),
            "{res:?}"
        );

        let res = read_value(
            &Schema::array(Schema::Primitive(Kind::U8)),
            &mut [1, 0xff, 0xff, 0xff, 0x7f, 1].as_slice(),
        );
        assert!(matches!(res, Err(Error::Truncated { .. })), "{res:?}");
    }

    #[test]
    fn invalid_data() {
        let res = read_value(&Schema::Primitive(Kind::Bool), &mut [2].as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let res = read_value(&Schema::Nullable(Kind::U8), &mut [7, 1].as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let res = read_value(
            &Schema::Primitive(Kind::String),
            &mut [1, 0xff, 0xff, 0xff, 0xff].as_slice(),
        );
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let res = read_value(
            &Schema::Primitive(Kind::String),
            &mut [1, 1, 0, 0, 0, 0x00, 0xDC].as_slice(),
        );
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");

        let mut decimal = [0; 16];
        decimal[14] = 29;
        let res = read_value(&Schema::Primitive(Kind::Decimal), &mut decimal.as_slice());
        assert!(matches!(res, Err(Error::InvalidData(..))), "{res:?}");
    }

    #[test]
    fn mismatch_writes_nothing() {
        let schema = Schema::record()
            .field("Id", Schema::Primitive(Kind::I32))
            .field("Name", Schema::Primitive(Kind::String))
            .build()
            .unwrap();
        let mut buf = BytesMut::from(&b"head"[..]);

        let res = write_value(
            &schema,
            &Value::Record(Record::new().with("Id", Value::I32(1)).with("Name", Value::U8(1))),
            &mut buf,
        );
        assert!(matches!(res, Err(Error::TypeMismatch { .. })), "{res:?}");
        assert_eq!(buf.as_ref(), b"head");

        let res = write_value(
            &schema,
            &Value::Record(Record::new().with("Name", "Josef")),
            &mut buf,
        );
        assert!(matches!(res, Err(Error::TypeMismatch { .. })), "{res:?}");
        assert_eq!(buf.as_ref(), b"head");

        let res = write_value(
            &schema,
            &Value::Record(Record::new().with("Id", Value::Null).with("Name", "Josef")),
            &mut buf,
        );
        assert!(matches!(res, Err(Error::NullValue { .. })), "{res:?}");
        assert_eq!(buf.as_ref(), b"head");

        let res = ValueEncoder::new(&Schema::Primitive(Kind::U8)).encode(&Value::Null, &mut buf);
        assert!(matches!(res, Err(Error::NullValue { .. })), "{res:?}");
        assert_eq!(buf.as_ref(), b"head");
    }

    #[test]
    fn described() {
        let schema = all_kinds_record();
        let value = Value::Record(
            Kind::ALL
                .into_iter()
                .map(|kind| (kind.name(), samples(kind).remove(0)))
                .collect(),
        );
        let mut buf = BytesMut::new();
        write_described(&schema, &value, &mut buf).unwrap();
        let (decoded_schema, decoded) = read_described(&mut buf.freeze()).unwrap();
        assert_eq!(decoded_schema, schema);
        let decoded = decoded.as_record().unwrap();
        for kind in Kind::ALL {
            assert_eq!(decoded.get(kind.name()), Some(&samples(kind).remove(0)));
        }
    }

    #[test]
    fn decoder_incomplete() {
        let schema = Schema::array(Schema::Primitive(Kind::String));
        let value = Value::Array(vec![Value::String("foo".into()), Value::Null]);
        let mut full = BytesMut::new();
        write_value(&schema, &value, &mut full).unwrap();

        let mut dec = ValueDecoder::new(schema);
        let mut src = BytesMut::new();
        for b in &full[..full.len() - 1] {
            src.extend_from_slice(&[*b]);
            assert_eq!(dec.decode(&mut src).unwrap(), None);
        }
        src.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(dec.decode(&mut src).unwrap(), Some(value));
        assert!(src.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn framed() -> Result<(), Error> {
        let schema = Schema::Nullable(Kind::U16);
        let mut buf = BytesMut::new();
        let mut enc = ValueEncoder::new(&schema);
        for value in [Value::U16(1), Value::Null, Value::U16(0xbeef)] {
            enc.encode(&value, &mut buf)?;
        }
        let values: Vec<Value> = FramedRead::new(buf.as_ref(), ValueDecoder::new(schema))
            .try_collect()
            .await?;
        assert_eq!(values, [Value::U16(1), Value::Null, Value::U16(0xbeef)]);

        let mut buf = BytesMut::new();
        write_schema(&Schema::array(Schema::Primitive(Kind::Bool)), &mut buf)?;
        let mut rx = FramedRead::new(buf.as_ref(), SchemaDecoder);
        assert_eq!(
            rx.try_next().await?,
            Some(Schema::array(Schema::Primitive(Kind::Bool)))
        );
        Ok(())
    }
}
