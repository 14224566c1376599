//! The local member's identity.
//!
//! Created on first run and reused afterwards, stored as
//! `identity/me.json`: `{ userId, displayName, pub, priv }` with base64
//! keys. The member id doubles as the logical clock's node id and as the
//! author of every record this member writes.

use crate::error::SyncResult;
use crate::fsutil::write_atomic;
use budgetmesh_crypto::{PublicKey, SigningIdentity};
use budgetmesh_types::MemberId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Location of the identity file relative to the data directory.
pub const IDENTITY_FILE: &str = "identity/me.json";

/// Who this installation is.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    member_id: MemberId,
    display_name: String,
    signing: SigningIdentity,
}

impl LocalIdentity {
    /// A fresh identity with a random member id and keypair.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self {
            member_id: MemberId::new(),
            display_name: display_name.into(),
            signing: SigningIdentity::generate(),
        }
    }

    /// Assembles an identity from parts.
    pub fn from_parts(member_id: MemberId, display_name: impl Into<String>, signing: SigningIdentity) -> Self {
        Self {
            member_id,
            display_name: display_name.into(),
            signing,
        }
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn signing(&self) -> &SigningIdentity {
        &self.signing
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing.public_key()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    user_id: String,
    display_name: String,
    #[serde(rename = "pub")]
    public: String,
    #[serde(rename = "priv")]
    private: String,
}

/// Reads and writes [`IDENTITY_FILE`].
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// A store for `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(IDENTITY_FILE),
        }
    }

    /// Path of the identity file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored identity, or creates and persists a new one named
    /// `display_name`.
    ///
    /// A stored identity keeps its own display name. An unreadable or
    /// inconsistent file is replaced by a fresh identity.
    pub fn load_or_create(&self, display_name: &str) -> SyncResult<LocalIdentity> {
        if self.path.exists() {
            match self.read() {
                Ok(identity) => return Ok(identity),
                Err(reason) => {
                    warn!(path = %self.path.display(), "replacing unusable identity: {reason}");
                }
            }
        }

        let identity = LocalIdentity::generate(display_name);
        self.write(&identity)?;
        info!(member = %identity.member_id, "created new identity");
        Ok(identity)
    }

    fn read(&self) -> Result<LocalIdentity, String> {
        let bytes = fs::read(&self.path).map_err(|e| e.to_string())?;
        let file: IdentityFile = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        let member_id = MemberId::parse(&file.user_id).map_err(|e| e.to_string())?;
        let signing = SigningIdentity::from_secret_base64(&file.private).map_err(|e| e.to_string())?;
        let stored_public = PublicKey::from_base64(&file.public).map_err(|e| e.to_string())?;
        if stored_public != signing.public_key() {
            return Err("public key does not match private key".into());
        }
        Ok(LocalIdentity::from_parts(member_id, file.display_name, signing))
    }

    fn write(&self, identity: &LocalIdentity) -> SyncResult<()> {
        let file = IdentityFile {
            user_id: identity.member_id.to_string(),
            display_name: identity.display_name.clone(),
            public: identity.public_key().to_base64(),
            private: identity.signing.secret_base64(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }
}
