use tracing::{instrument, trace};

use crate::Error;

/// Length of a request head
pub const HEAD_LEN: usize = 64;

/// Offset of the argument length within the head
pub const ARGS_LEN_OFFSET: usize = 60;

/// Maximum method name length in UTF-16 code units
pub const MAX_NAME_LEN: usize = (ARGS_LEN_OFFSET - 1) / 2;

/// Maximum argument or result payload length accepted from a peer
pub const MAX_PAYLOAD_LEN: usize = 1 << 28;

/// Validates a method name and returns its UTF-16 code units
pub(crate) fn name_units(name: &str) -> Result<Vec<u16>, Error> {
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.is_empty() || units.len() > MAX_NAME_LEN {
        return Err(Error::Protocol(format!(
            "method name `{name}` must be 1 to {MAX_NAME_LEN} UTF-16 code units long, got {}",
            units.len()
        )));
    }
    Ok(units)
}

/// Validates a payload length and converts it to its wire representation
pub(crate) fn payload_len(n: usize) -> Result<i32, Error> {
    if n > MAX_PAYLOAD_LEN {
        return Err(Error::Protocol(format!(
            "payload of {n} bytes exceeds maximum of {MAX_PAYLOAD_LEN}"
        )));
    }
    i32::try_from(n).map_err(|_| Error::Protocol(format!("payload of {n} bytes is too large")))
}

/// Parses a payload length received from a peer
pub(crate) fn parse_payload_len(n: i32) -> Result<usize, Error> {
    match usize::try_from(n) {
        Ok(n) if n <= MAX_PAYLOAD_LEN => Ok(n),
        Ok(n) => Err(Error::Protocol(format!(
            "payload of {n} bytes exceeds maximum of {MAX_PAYLOAD_LEN}"
        ))),
        Err(_) => Err(Error::Protocol(format!("negative payload length {n}"))),
    }
}

/// Encodes a request head: name length, UTF-16LE name, zero fill and the argument length.
#[instrument(level = "trace", ret(level = "trace"))]
pub fn encode_head(name: &str, args_len: usize) -> Result<[u8; HEAD_LEN], Error> {
    let units = name_units(name)?;
    let args_len = payload_len(args_len)?;
    let mut head = [0; HEAD_LEN];
    // `units.len()` is bounded by `MAX_NAME_LEN`
    head[0] = units.len() as u8;
    for (i, unit) in units.into_iter().enumerate() {
        let i = 1 + i * 2;
        head[i..i + 2].copy_from_slice(&unit.to_le_bytes());
    }
    head[ARGS_LEN_OFFSET..].copy_from_slice(&args_len.to_le_bytes());
    Ok(head)
}

/// Decodes a request head into the method name and argument length
#[instrument(level = "trace", skip_all, ret(level = "trace"))]
pub fn decode_head(head: &[u8; HEAD_LEN]) -> Result<(String, usize), Error> {
    let n = usize::from(head[0]);
    trace!(n, "decoding method name");
    if n == 0 || n > MAX_NAME_LEN {
        return Err(Error::Protocol(format!(
            "method name length {n} is out of range 1..={MAX_NAME_LEN}"
        )));
    }
    let units: Vec<u16> = head[1..1 + n * 2]
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .collect();
    let name = String::from_utf16(&units)
        .map_err(|err| Error::Protocol(format!("method name is not valid UTF-16: {err}")))?;
    let mut args_len = [0; 4];
    args_len.copy_from_slice(&head[ARGS_LEN_OFFSET..]);
    let args_len = parse_payload_len(i32::from_le_bytes(args_len))?;
    Ok((name, args_len))
}
