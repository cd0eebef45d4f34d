use core::fmt;

use std::path::PathBuf;

use crate::{Cipher, FaultObserver, HandlerTable};

/// Server configuration
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Key material file, streams are not encrypted if unset or missing
    pub key_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads the configured cipher
    ///
    /// # Errors
    ///
    /// Returns an error if the key file exists, but cannot be loaded
    pub async fn cipher(&self) -> std::io::Result<Option<Cipher>> {
        load_cipher(self.key_file.as_ref()).await
    }
}

/// Client configuration
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Key material file, streams are not encrypted if unset or missing
    pub key_file: Option<PathBuf>,
    /// Handlers served on a callback stream, no callback stream is opened if unset
    pub callbacks: Option<HandlerTable>,
    /// Observer of faults on the callback stream
    pub on_fault: Option<FaultObserver>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("key_file", &self.key_file)
            .field("callbacks", &self.callbacks)
            .field("on_fault", &self.on_fault.is_some())
            .finish()
    }
}

impl ClientConfig {
    /// Loads the configured cipher
    ///
    /// # Errors
    ///
    /// Returns an error if the key file exists, but cannot be loaded
    pub async fn cipher(&self) -> std::io::Result<Option<Cipher>> {
        load_cipher(self.key_file.as_ref()).await
    }
}

async fn load_cipher(path: Option<&PathBuf>) -> std::io::Result<Option<Cipher>> {
    match path {
        Some(path) => Cipher::load(path).await,
        None => Ok(None),
    }
}
