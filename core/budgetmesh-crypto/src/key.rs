//! Key material: scrypt-derived channel keys and random device keys.

use crate::error::{CryptoError, CryptoResult};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;

/// Per-frame scrypt salt.
pub type Salt = [u8; SALT_SIZE];

/// A 256-bit symmetric key, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        <[u8; KEY_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::KeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// scrypt cost. Every member of a group must agree on it, since the
/// parameters are not carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// log2(N)
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    /// N = 2^15, r = 8, p = 1.
    fn default() -> Self {
        Self { log_n: 15, r: 8, p: 1 }
    }
}

impl KdfParams {
    /// N = 2^4. Only for tests; peers using it cannot talk to real ones.
    pub fn insecure_fast() -> Self {
        Self { log_n: 4, ..Self::default() }
    }
}

pub fn random_salt() -> Salt {
    rand::random()
}

/// Stretches the group passphrase into a channel key.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<DerivedKey> {
    let cost = scrypt::Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &cost, &mut out[..])
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(DerivedKey(*out))
}

pub fn generate_random_key() -> DerivedKey {
    DerivedKey(rand::random())
}
