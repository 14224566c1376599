//! Ed25519 signing identities for per-message authentication.

use crate::error::{CryptoError, CryptoResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::{
    Signature as DalekSignature, Signer as _, SigningKey as DalekSigningKey, Verifier as _,
    VerifyingKey as DalekVerifyingKey,
};
use rand::rngs::OsRng;

/// A member's long-lived signing keypair.
#[derive(Clone)]
pub struct SigningIdentity {
    signing: DalekSigningKey,
}

/// The public half of a [`SigningIdentity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekVerifyingKey);

impl SigningIdentity {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing: DalekSigningKey::generate(&mut OsRng),
        }
    }

    /// Restores from a raw 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing: DalekSigningKey::from_bytes(bytes),
        }
    }

    /// Restores from a base64 secret, as persisted in the identity file.
    pub fn from_secret_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self::from_secret_bytes(&secret))
    }

    /// Returns the raw 32-byte secret.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Returns the secret as base64.
    pub fn secret_base64(&self) -> String {
        STANDARD.encode(self.signing.to_bytes())
    }

    /// Returns the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key())
    }

    /// Signs `message`, returning the 64-byte signature as base64.
    pub fn sign_base64(&self, message: &[u8]) -> String {
        STANDARD.encode(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &self.public_key().to_base64())
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Decodes a raw 32-byte public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::PublicKey)
    }

    /// Decodes a base64 public key.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::PublicKey)?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::PublicKey)?;
        Self::from_bytes(&raw)
    }

    /// Returns the raw 32-byte key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Returns the key as base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.to_bytes())
    }

    /// Verifies a base64 signature over `message`.
    pub fn verify_base64(&self, message: &[u8], signature_b64: &str) -> CryptoResult<()> {
        let bytes = STANDARD
            .decode(signature_b64.trim())
            .map_err(|_| CryptoError::BadSignature)?;
        let raw: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::BadSignature)?;
        self.0
            .verify(message, &DalekSignature::from_bytes(&raw))
            .map_err(|_| CryptoError::BadSignature)
    }
}
