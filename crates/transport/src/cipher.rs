//! Symmetric field encryption.
//!
//! When a cipher is configured, every field written to a stream is zero-padded to a multiple of
//! [`BLOCK_LEN`] and encrypted with AES-256-CBC, restarting from the configured IV for each field.
//! Both peers must be configured with the same key material.
//!
//! # Limitations
//!
//! Since no field is chained to the one before it, equal fields encrypt to equal ciphertext, and
//! so do the leading blocks of fields sharing a 16-byte prefix. An observer can therefore tell
//! repeated status words or handshake signals apart from distinct ones. The cipher
//! only hides field contents from peers without the key, it provides no integrity protection.

use core::fmt;

use std::io;
use std::path::Path;

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use tracing::{debug, instrument};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// Key length in bytes
pub const KEY_LEN: usize = 32;

/// IV length in bytes
pub const IV_LEN: usize = 16;

/// Cipher block length in bytes, encrypted fields are padded to a multiple of it
pub const BLOCK_LEN: usize = 16;

/// Length of key material files, the key followed by the IV
pub const KEY_MATERIAL_LEN: usize = KEY_LEN + IV_LEN;

/// AES-256-CBC field cipher
#[derive(Clone, PartialEq, Eq)]
pub struct Cipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    #[must_use]
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Parses key material, [`KEY_LEN`] bytes of key followed by [`IV_LEN`] bytes of IV
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if `material` is not exactly [`KEY_MATERIAL_LEN`]
    /// bytes long
    pub fn from_key_material(material: &[u8]) -> io::Result<Self> {
        let Some((key, iv)) = material.split_first_chunk::<KEY_LEN>() else {
            return Err(invalid_key_material(material.len()));
        };
        let Ok(iv) = <[u8; IV_LEN]>::try_from(iv) else {
            return Err(invalid_key_material(material.len()));
        };
        Ok(Self::new(*key, iv))
    }

    /// Loads key material from a file.
    ///
    /// A missing file means the stream is not encrypted and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists, but cannot be read or holds malformed key material
    #[instrument(level = "trace", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        match tokio::fs::read(path.as_ref()).await {
            Ok(material) => {
                debug!("loaded key material");
                Self::from_key_material(&material).map(Some)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("key material not found, streams will not be encrypted");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Length of a field of `n` bytes once encrypted
    #[must_use]
    pub fn padded_len(n: usize) -> usize {
        n.div_ceil(BLOCK_LEN) * BLOCK_LEN
    }

    /// Pads and encrypts a field
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if the padded field is rejected by the block mode
    pub fn encrypt(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let n = Self::padded_len(data.len());
        let mut buf = vec![0; n];
        buf[..data.len()].copy_from_slice(data);
        Encryptor::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buf, n)
            .map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "failed to encrypt field")
            })?;
        Ok(buf)
    }

    /// Decrypts a padded field in place
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidData`] if `buf` is not block-aligned
    pub fn decrypt(&self, buf: &mut [u8]) -> io::Result<()> {
        let n = buf.len();
        Decryptor::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_mut::<NoPadding>(buf)
            .map(|_| ())
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("encrypted field of {n} bytes is not block-aligned"),
                )
            })
    }
}

fn invalid_key_material(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("key material must be {KEY_MATERIAL_LEN} bytes long, got {len}"),
    )
}
