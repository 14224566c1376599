//! ChaCha20-Poly1305 with a random 96-bit nonce per message.
//!
//! The nonce travels in front of the ciphertext and the 16-byte tag is the
//! ciphertext's tail.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Length of `nonce ‖ ciphertext`.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Appends `nonce ‖ ciphertext` to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.len());
        out.extend(self.nonce.iter().chain(&self.ciphertext));
    }

    /// Splits `nonce ‖ ciphertext`; anything shorter than nonce plus tag is refused.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let Some((nonce, ciphertext)) = bytes.split_first_chunk::<NONCE_SIZE>() else {
            return Err(CryptoError::Open("missing nonce"));
        };
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::Open("missing tag"));
        }
        Ok(Self {
            nonce: *nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        let mut raw = Vec::new();
        self.write_to(&mut raw);
        STANDARD.encode(raw)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        Self::from_slice(&STANDARD.decode(encoded.trim())?)
    }
}

fn aead(key: &DerivedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let nonce: [u8; NONCE_SIZE] = rand::random();
    let ciphertext = aead(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Seal)?;
    Ok(EncryptedData { nonce, ciphertext })
}

pub fn decrypt(key: &DerivedKey, sealed: &EncryptedData) -> CryptoResult<Vec<u8>> {
    aead(key)
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map_err(|_| CryptoError::Open("authentication failed"))
}
