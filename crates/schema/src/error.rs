use core::fmt::{self, Debug, Display};

/// Error returned by schema construction and the value codec
pub enum Error {
    /// A shape could not be mapped to any schema category
    SchemaBuild(String),
    /// Schema discriminant byte is not recognized
    UnknownDiscriminant(u8),
    /// Input ended before the value or schema was complete
    Truncated {
        /// Bytes required by the next read
        needed: usize,
        /// Bytes left in the input
        remaining: usize,
    },
    /// Value does not conform to the schema used to encode it
    TypeMismatch {
        /// Schema expectation
        expected: String,
        /// What was found instead
        found: String,
    },
    /// Absent value for a schema that does not permit it
    NullValue {
        /// Schema expectation
        expected: String,
    },
    /// Bytes are well-framed, but do not form a valid value
    InvalidData(String),
    /// I/O error
    Io(std::io::Error),
}

impl Error {
    /// Whether the error was caused by a malformed schema encoding
    #[must_use]
    pub fn is_schema_decode(&self) -> bool {
        matches!(self, Self::UnknownDiscriminant(..))
    }

    pub(crate) fn mismatch(expected: impl Display, found: impl Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => Debug::fmt(err, f),
            _ => Display::fmt(self, f),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaBuild(reason) => write!(f, "failed to build schema: {reason}"),
            Self::UnknownDiscriminant(tag) => {
                write!(f, "unknown schema discriminant byte: {tag:#04x}")
            }
            Self::Truncated { needed, remaining } => write!(
                f,
                "input truncated: needed {needed} bytes, {remaining} remaining"
            ),
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected `{expected}`, found `{found}`")
            }
            Self::NullValue { expected } => {
                write!(f, "absent value for non-nullable `{expected}`")
            }
            Self::InvalidData(reason) => write!(f, "invalid data: {reason}"),
            Self::Io(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::Truncated { .. } => {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, err.to_string())
            }
            err => std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        }
    }
}
