//! Frame protocol.
//!
//! A request is a [`HEAD_LEN`]-byte head carrying the method name and argument length, followed by
//! the encoded arguments. A response is the encoded result, when the method has one, followed by a
//! status word and, for application errors, the error code. With a [Cipher] every one of these
//! fields is encrypted independently.

use core::fmt;

use bytes::{Buf as _, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, instrument, trace};

use crate::{Cipher, Error};

mod conn;
mod head;
#[cfg(feature = "net")]
pub mod tcp;

pub use conn::*;
pub use head::*;

/// Response status word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    /// Application error, followed by the error code
    Application = 1,
    /// Unhandled handler failure
    Unhandled = 2,
}

impl Status {
    #[must_use]
    pub fn from_word(word: i32) -> Option<Self> {
        match word {
            0 => Some(Self::Ok),
            1 => Some(Self::Application),
            2 => Some(Self::Unhandled),
            _ => None,
        }
    }
}

/// Received request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub name: String,
    pub args: Bytes,
}

/// Outcome of a served request as sent to the caller
#[derive(Clone, PartialEq, Eq)]
pub enum Response {
    /// Encoded result, empty for methods without one
    Ok(Bytes),
    Application(i32),
    Unhandled,
}

impl Response {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Ok(..) => Status::Ok,
            Self::Application(..) => Status::Application,
            Self::Unhandled => Status::Unhandled,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(payload) => write!(f, "Ok({payload:02x?})"),
            Self::Application(code) => write!(f, "Application({code})"),
            Self::Unhandled => f.write_str("Unhandled"),
        }
    }
}

/// Appends a field to `dst`, encrypting it if a cipher is set
fn put_field(dst: &mut BytesMut, cipher: Option<&Cipher>, data: &[u8]) -> std::io::Result<()> {
    if let Some(cipher) = cipher {
        dst.extend_from_slice(&cipher.encrypt(data)?);
    } else {
        dst.extend_from_slice(data);
    }
    Ok(())
}

/// Reads a field of `n` bytes, decrypting it if a cipher is set
async fn read_field(
    rx: &mut (impl AsyncRead + Unpin),
    cipher: Option<&Cipher>,
    n: usize,
) -> std::io::Result<BytesMut> {
    let Some(cipher) = cipher else {
        let mut buf = BytesMut::zeroed(n);
        rx.read_exact(&mut buf).await?;
        return Ok(buf);
    };
    let mut buf = BytesMut::zeroed(Cipher::padded_len(n));
    rx.read_exact(&mut buf).await?;
    cipher.decrypt(&mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

/// Writes a single 32-bit field and flushes the stream
#[instrument(level = "trace", skip(tx, cipher))]
pub async fn write_i32(
    tx: &mut (impl AsyncWrite + Unpin),
    cipher: Option<&Cipher>,
    v: i32,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(16);
    put_field(&mut buf, cipher, &v.to_le_bytes())?;
    tx.write_all(&buf).await?;
    tx.flush().await
}

/// Reads a single 32-bit field
#[instrument(level = "trace", skip_all, ret(level = "trace"))]
pub async fn read_i32(
    rx: &mut (impl AsyncRead + Unpin),
    cipher: Option<&Cipher>,
) -> std::io::Result<i32> {
    let mut buf = read_field(rx, cipher, 4).await?;
    Ok(buf.get_i32_le())
}

/// Writes a request
#[instrument(level = "trace", skip(tx, cipher, args), fields(args = args.len()))]
pub async fn send_request(
    tx: &mut (impl AsyncWrite + Unpin),
    cipher: Option<&Cipher>,
    name: &str,
    args: &[u8],
) -> Result<(), Error> {
    let head = encode_head(name, args.len())?;
    let mut buf = BytesMut::with_capacity(HEAD_LEN + Cipher::padded_len(args.len()));
    put_field(&mut buf, cipher, &head)?;
    put_field(&mut buf, cipher, args)?;
    trace!(len = buf.len(), "writing request");
    tx.write_all(&buf).await?;
    tx.flush().await?;
    Ok(())
}

/// Reads a request.
///
/// Returns `None` if the stream ended cleanly before a new request started.
#[instrument(level = "trace", skip_all)]
pub async fn receive_request(
    rx: &mut (impl AsyncRead + Unpin),
    cipher: Option<&Cipher>,
) -> Result<Option<Request>, Error> {
    // `HEAD_LEN` is block-aligned, so the encrypted head is the same length
    let mut head = [0; HEAD_LEN];
    let n = rx.read(&mut head).await?;
    if n == 0 {
        debug!("stream closed");
        return Ok(None);
    }
    rx.read_exact(&mut head[n..]).await?;
    if let Some(cipher) = cipher {
        cipher.decrypt(&mut head)?;
    }
    let (name, args_len) = decode_head(&head)?;
    trace!(%name, args_len, "reading arguments");
    let args = read_field(rx, cipher, args_len).await?;
    Ok(Some(Request {
        name,
        args: args.freeze(),
    }))
}

/// Writes a response.
///
/// `returns` states whether the method declares a result, in which case the result length is
/// written regardless of the status.
#[instrument(level = "trace", skip(tx, cipher))]
pub async fn send_response(
    tx: &mut (impl AsyncWrite + Unpin),
    cipher: Option<&Cipher>,
    returns: bool,
    response: &Response,
) -> Result<(), Error> {
    let mut buf = BytesMut::new();
    if returns {
        let payload: &[u8] = if let Response::Ok(payload) = response {
            payload.as_ref()
        } else {
            &[]
        };
        put_field(&mut buf, cipher, &payload_len(payload.len())?.to_le_bytes())?;
        put_field(&mut buf, cipher, payload)?;
    }
    put_field(&mut buf, cipher, &(response.status() as i32).to_le_bytes())?;
    if let Response::Application(code) = response {
        put_field(&mut buf, cipher, &code.to_le_bytes())?;
    }
    trace!(len = buf.len(), "writing response");
    tx.write_all(&buf).await?;
    tx.flush().await?;
    Ok(())
}

/// Reads a response and returns the encoded result, empty if `returns` is false.
///
/// Remote failures are returned as [`Error::RemoteApplication`] and [`Error::RemoteUnhandled`].
#[instrument(level = "trace", skip(rx, cipher))]
pub async fn receive_response(
    rx: &mut (impl AsyncRead + Unpin),
    cipher: Option<&Cipher>,
    returns: bool,
) -> Result<Bytes, Error> {
    let payload = if returns {
        let n = parse_payload_len(read_i32(rx, cipher).await?)?;
        trace!(n, "reading result");
        read_field(rx, cipher, n).await?.freeze()
    } else {
        Bytes::new()
    };
    let status = read_i32(rx, cipher).await?;
    match Status::from_word(status) {
        Some(Status::Ok) => Ok(payload),
        Some(Status::Application) => {
            let code = read_i32(rx, cipher).await?;
            Err(Error::RemoteApplication(code))
        }
        Some(Status::Unhandled) => Err(Error::RemoteUnhandled),
        None => Err(Error::Protocol(format!("unknown response status {status}"))),
    }
}
