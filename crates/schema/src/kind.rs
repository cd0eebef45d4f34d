use core::fmt::{self, Display};

/// High bit marking a nullable primitive in a schema discriminant
pub const NULLABLE_BIT: u8 = 0x80;

/// Schema discriminant of an array node
pub const ARRAY_TAG: u8 = 16;

/// Schema discriminant of a record node
pub const RECORD_TAG: u8 = 17;

/// Primitive value kind
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    U8 = 1,
    I8 = 2,
    I16 = 3,
    U16 = 4,
    I32 = 5,
    U32 = 6,
    I64 = 7,
    U64 = 8,
    F32 = 9,
    F64 = 10,
    Decimal = 11,
    Bool = 12,
    Char = 13,
    String = 14,
    DateTime = 15,
    Guid = 18,
}

impl Kind {
    /// All primitive kinds in discriminant order
    pub const ALL: [Self; 16] = [
        Self::U8,
        Self::I8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::Bool,
        Self::Char,
        Self::String,
        Self::DateTime,
        Self::Guid,
    ];

    /// Returns the kind for a discriminant byte with the nullable bit cleared
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == tag)
    }

    /// Schema discriminant of this kind
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Strings are reference values and always carry a presence sentinel
    #[must_use]
    pub fn is_always_nullable(self) -> bool {
        self == Self::String
    }

    /// Number of payload bytes, `None` for variable-width kinds
    #[must_use]
    pub fn width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 | Self::Bool => Some(1),
            Self::I16 | Self::U16 | Self::Char => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::DateTime => Some(8),
            Self::Decimal | Self::Guid => Some(16),
            Self::String => None,
        }
    }

    /// Human-readable name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "byte",
            Self::I8 => "sbyte",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Guid => "guid",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
