//! Crypto failures.
//!
//! Opening a frame never says which check failed: wrong passphrase,
//! truncation and tampering all surface as [`CryptoError::Open`].

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("scrypt rejected its parameters: {0}")]
    Kdf(String),

    #[error("AEAD seal failed")]
    Seal,

    #[error("cannot open sealed data: {0}")]
    Open(&'static str),

    #[error("key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    #[error("malformed public key")]
    PublicKey,

    #[error("signature does not verify")]
    BadSignature,

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error("key file: {0}")]
    KeyFile(#[from] std::io::Error),
}
