//! Cryptography for BudgetMesh.
//!
//! - [`ChannelCipher`]: passphrase-keyed encryption of every gossip datagram
//!   (scrypt + ChaCha20-Poly1305, fresh salt per message)
//! - [`DeviceKey`]: local sealing of secrets at rest
//! - [`SigningIdentity`]: ed25519 keys that sign each message

mod channel;
mod cipher;
mod device;
mod error;
mod key;
mod signing;

pub use channel::{ChannelCipher, MAX_SALT_LEN};
pub use cipher::{EncryptedData, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use device::{DEVICE_KEY_FILE, DeviceKey};
pub use error::{CryptoError, CryptoResult};
pub use key::{DerivedKey, KEY_SIZE, KdfParams, SALT_SIZE, Salt, derive_key, generate_random_key,
    random_salt};
pub use signing::{PublicKey, SigningIdentity};
