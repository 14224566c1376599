//! Group channel encryption.
//!
//! Every datagram is encrypted under a key derived from the group passphrase
//! with a fresh salt, so no key material is ever shared beyond the
//! passphrase itself. Frame layout:
//!
//! ```text
//! u32be(salt_len) ‖ salt ‖ nonce(12) ‖ ciphertext ‖ tag(16)
//! ```

use crate::cipher::{self, EncryptedData, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{KdfParams, SALT_SIZE, derive_key, random_salt};
use zeroize::Zeroizing;

/// Largest salt length accepted from the wire.
pub const MAX_SALT_LEN: usize = 64;

const LEN_PREFIX: usize = 4;

/// Encrypts and decrypts channel frames for one group passphrase.
#[derive(Clone)]
pub struct ChannelCipher {
    passphrase: Zeroizing<String>,
    params: KdfParams,
}

impl ChannelCipher {
    /// Creates a cipher with the production KDF cost.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self::with_params(passphrase, KdfParams::default())
    }

    /// Creates a cipher with explicit KDF parameters.
    pub fn with_params(passphrase: impl Into<String>, params: KdfParams) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            params,
        }
    }

    /// The KDF parameters in use.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Encrypts `plaintext` into a self-describing frame.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let salt = random_salt();
        let key = derive_key(&self.passphrase, &salt, &self.params)?;
        let sealed = cipher::encrypt(&key, plaintext)?;

        let mut frame = Vec::with_capacity(LEN_PREFIX + SALT_SIZE + sealed.len());
        frame.extend_from_slice(&(SALT_SIZE as u32).to_be_bytes());
        frame.extend_from_slice(&salt);
        sealed.write_to(&mut frame);
        Ok(frame)
    }

    /// Decrypts a frame produced by [`ChannelCipher::encrypt`].
    ///
    /// Malformed framing and authentication failures are both
    /// [`CryptoError::Open`].
    pub fn decrypt(&self, frame: &[u8]) -> CryptoResult<Vec<u8>> {
        let (salt, rest) = split_frame(frame)?;
        let sealed = EncryptedData::from_slice(rest)?;
        let key = derive_key(&self.passphrase, salt, &self.params)?;
        cipher::decrypt(&key, &sealed)
    }
}

impl std::fmt::Debug for ChannelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCipher")
            .field("passphrase", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

fn split_frame(frame: &[u8]) -> CryptoResult<(&[u8], &[u8])> {
    let Some((prefix, rest)) = frame.split_first_chunk::<LEN_PREFIX>() else {
        return Err(CryptoError::Open("frame too short"));
    };
    let salt_len = u32::from_be_bytes(*prefix) as usize;
    if salt_len == 0 || salt_len > MAX_SALT_LEN || salt_len > rest.len() {
        return Err(CryptoError::Open("salt length out of bounds"));
    }
    let (salt, body) = rest.split_at(salt_len);
    if body.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Open("frame too short"));
    }
    Ok((salt, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_rejects_oversized_salt() {
        let mut frame = (MAX_SALT_LEN as u32 + 1).to_be_bytes().to_vec();
        frame.extend(std::iter::repeat_n(0u8, 200));
        assert!(split_frame(&frame).is_err());
    }

    #[test]
    fn split_rejects_zero_salt() {
        let mut frame = 0u32.to_be_bytes().to_vec();
        frame.extend(std::iter::repeat_n(0u8, 64));
        assert!(split_frame(&frame).is_err());
    }

    #[test]
    fn split_rejects_missing_tag() {
        let mut frame = 16u32.to_be_bytes().to_vec();
        frame.extend(std::iter::repeat_n(0u8, 16 + NONCE_SIZE + TAG_SIZE - 1));
        assert!(split_frame(&frame).is_err());
    }

    #[test]
    fn split_accepts_minimal_frame() {
        let mut frame = 16u32.to_be_bytes().to_vec();
        frame.extend(std::iter::repeat_n(7u8, 16 + NONCE_SIZE + TAG_SIZE));
        let (salt, body) = split_frame(&frame).unwrap();
        assert_eq!(salt.len(), 16);
        assert_eq!(body.len(), NONCE_SIZE + TAG_SIZE);
    }
}
