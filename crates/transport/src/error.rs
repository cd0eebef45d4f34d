use core::fmt::{self, Debug, Display};

/// Error returned by invocations and by the frame protocol
pub enum Error {
    /// Remote handler signalled an application error with the given code
    RemoteApplication(i32),
    /// Remote handler failed with a non-application error
    RemoteUnhandled,
    /// Peer violated the frame protocol, the connection is no longer usable
    Protocol(String),
    /// Peer requested a method with no registered handler
    UnknownMethod(String),
    /// Arguments or result could not be encoded or decoded
    Codec(wirecall_schema::Error),
    /// Underlying stream failed
    Connection(std::io::Error),
    /// Connection was closed locally
    Closed,
}

impl Error {
    /// Application error code, if the remote handler signalled one
    #[must_use]
    pub fn application_code(&self) -> Option<i32> {
        if let Self::RemoteApplication(code) = self {
            Some(*code)
        } else {
            None
        }
    }

    /// Whether the connection must be discarded after this error
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(..) | Self::UnknownMethod(..) | Self::Connection(..) | Self::Closed
        )
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(err) => Debug::fmt(err, f),
            Self::Connection(err) => Debug::fmt(err, f),
            _ => Display::fmt(self, f),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteApplication(code) => {
                write!(f, "remote handler failed with application error code {code}")
            }
            Self::RemoteUnhandled => f.write_str("remote handler failed with an unhandled error"),
            Self::Protocol(reason) => write!(f, "protocol violation: {reason}"),
            Self::UnknownMethod(name) => {
                write!(f, "method `{name}` does not have a handler registered")
            }
            Self::Codec(err) => Display::fmt(err, f),
            Self::Connection(err) => Display::fmt(err, f),
            Self::Closed => f.write_str("connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err)
    }
}

impl From<wirecall_schema::Error> for Error {
    fn from(err: wirecall_schema::Error) -> Self {
        Self::Codec(err)
    }
}

/// Error returned by method handlers
pub enum HandlerError {
    /// Failure the caller is expected to handle, sent back as its numeric code
    Application(i32),
    /// Any other failure, the caller only learns that the handler failed
    Other(anyhow::Error),
}

impl HandlerError {
    /// Wraps any error as [`HandlerError::Other`]
    pub fn other(err: impl Into<anyhow::Error>) -> Self {
        Self::Other(err.into())
    }
}

impl Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(code) => write!(f, "application error code {code}"),
            Self::Other(err) => Debug::fmt(err, f),
        }
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(code) => write!(f, "application error code {code}"),
            Self::Other(err) => Display::fmt(err, f),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

impl From<wirecall_schema::Error> for HandlerError {
    fn from(err: wirecall_schema::Error) -> Self {
        Self::Other(err.into())
    }
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        Self::Other(err.into())
    }
}
