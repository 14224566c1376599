//! Per-installation device key.
//!
//! A random key that never leaves the machine. It seals secrets that must be
//! persisted locally, such as the group passphrase in the session file.

use crate::cipher::{self, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, generate_random_key};
use std::fs;
use std::io::Write;
use std::path::Path;

/// File name of the device key inside a data directory.
pub const DEVICE_KEY_FILE: &str = "device.key";

/// The local sealing key.
#[derive(Clone, Debug)]
pub struct DeviceKey {
    key: DerivedKey,
}

impl DeviceKey {
    /// Wraps an existing key.
    pub fn from_key(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Loads the key at `path`, creating it on first use.
    ///
    /// A file of the wrong length is an error rather than being replaced,
    /// since replacing it would orphan everything it sealed.
    pub fn load_or_create(path: &Path) -> CryptoResult<Self> {
        if path.exists() {
            let bytes = fs::read(path)?;
            return Ok(Self {
                key: DerivedKey::try_from_slice(&bytes)?,
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = generate_random_key();
        let mut file = create_owner_only(path)?;
        file.write_all(key.as_bytes())?;
        file.sync_all()?;
        Ok(Self { key })
    }

    /// Seals `plaintext` as `base64(nonce ‖ ciphertext)`.
    pub fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        Ok(cipher::encrypt(&self.key, plaintext.as_bytes())?.to_base64())
    }

    /// Opens a value produced by [`DeviceKey::seal`].
    pub fn open(&self, sealed: &str) -> CryptoResult<String> {
        let data = EncryptedData::from_base64(sealed)?;
        let plaintext = cipher::decrypt(&self.key, &data)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Open("sealed value is not UTF-8"))
    }
}

#[cfg(unix)]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
