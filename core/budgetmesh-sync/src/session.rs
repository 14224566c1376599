//! The last session, persisted so a restart rejoins without prompting.
//!
//! Stored as `session.json` in the data directory:
//!
//! ```json
//! { "lastSession": { "displayName": "...", "groupId": "...", "port": 7800,
//!                    "seeds": ["host[port]"], "encGroupPass": "<sealed>" } }
//! ```
//!
//! The group passphrase is sealed with the [`DeviceKey`] and is never
//! written in clear.

use crate::error::{SyncError, SyncResult};
use crate::fsutil::write_atomic;
use crate::seeds::{DEFAULT_PORT, SeedSink, normalize_seed};
use budgetmesh_crypto::DeviceKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the session descriptor inside a data directory.
pub const SESSION_FILE: &str = "session.json";

/// A restorable session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub display_name: String,
    pub group_id: String,
    pub port: u16,
    pub seeds: Vec<String>,
    pub passphrase: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("display_name", &self.display_name)
            .field("group_id", &self.group_id)
            .field("port", &self.port)
            .field("seeds", &self.seeds)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    #[serde(default)]
    last_session: Option<StoredSession>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    seeds: Vec<String>,
    #[serde(default)]
    enc_group_pass: Option<String>,
}

/// Reads and writes [`SESSION_FILE`].
pub struct SessionStore {
    path: PathBuf,
    device_key: DeviceKey,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// A store for `data_dir`, sealing with `device_key`.
    pub fn new(data_dir: &Path, device_key: DeviceKey) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
            device_key,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restores the last session.
    ///
    /// A missing, unreadable, corrupt or incomplete file, or a passphrase
    /// that no longer opens with this device's key, all yield `None`.
    pub fn load(&self) -> Option<Session> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "cannot read session: {e}");
                return None;
            }
        };
        let file: SessionFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), "corrupt session file: {e}");
                return None;
            }
        };
        let stored = file.last_session?;

        let passphrase = match stored.enc_group_pass.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(sealed) => match self.device_key.open(sealed) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("stored passphrase does not open with this device key: {e}");
                    None
                }
            },
            None => None,
        };

        let (Some(display_name), Some(group_id), Some(passphrase)) =
            (stored.display_name, stored.group_id, passphrase)
        else {
            debug!("incomplete session, ignoring");
            return None;
        };

        Some(Session {
            display_name,
            group_id,
            port: stored.port.unwrap_or(DEFAULT_PORT),
            seeds: stored
                .seeds
                .iter()
                .filter_map(|s| normalize_seed(s).ok())
                .collect(),
            passphrase,
        })
    }

    /// Persists `session`, replacing any previous one.
    pub fn save(&self, session: &Session) -> SyncResult<()> {
        let stored = StoredSession {
            display_name: Some(session.display_name.clone()),
            group_id: Some(session.group_id.clone()),
            port: Some(session.port),
            seeds: session.seeds.clone(),
            enc_group_pass: Some(self.device_key.seal(&session.passphrase)?),
        };
        let json = serde_json::to_vec_pretty(&SessionFile {
            last_session: Some(stored),
        })?;

        let _guard = self.write_lock.lock();
        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Forgets the last session.
    pub fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Io(e)),
        }
    }
}

impl SeedSink for SessionStore {
    fn save_seeds(&self, seeds: &[String]) -> SyncResult<()> {
        let Some(mut session) = self.load() else {
            debug!("no session to attach seeds to");
            return Ok(());
        };
        session.seeds = seeds.to_vec();
        self.save(&session)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
