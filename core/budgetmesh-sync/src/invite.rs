//! Invitation codes and join links.
//!
//! An invitation code lets a new member reach an existing one without a
//! rendezvous server. It names the group and a public endpoint, expires
//! after an hour, and is authenticated with the group passphrase so that a
//! code is useless to anyone who does not already hold it:
//!
//! ```text
//! BUDP2P1.<b64url(gid|host|port|exp)>.<b64url(HMAC-SHA256(SHA-256(pass), payload))>
//! ```
//!
//! A join link carries the passphrase itself and is meant for trusted
//! out-of-band channels only.

use crate::seeds::normalize_seed;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Leading tag of every invitation code.
pub const INVITE_TAG: &str = "BUDP2P1";

/// How long a fresh invitation stays valid.
pub const INVITE_VALIDITY_SECS: u64 = 3600;

/// Scheme and path prefix of a join link.
pub const JOIN_LINK_PREFIX: &str = "budgetmesh://join#";

/// Why an invitation was refused. The display text is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InviteError {
    #[error("empty invite")]
    Empty,
    #[error("bad format")]
    BadFormat,
    #[error("bad signature")]
    BadSignature,
    #[error("bad payload")]
    BadPayload,
    #[error("invite expired")]
    Expired,
}

/// The verified content of an invitation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub group_id: String,
    pub host: String,
    pub port: u16,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: u64,
}

impl Invite {
    /// The invited endpoint as a canonical seed.
    pub fn seed(&self) -> String {
        format!("{}[{}]", self.host, self.port)
    }
}

/// Creates and verifies invitation codes.
pub struct InviteCode;

impl InviteCode {
    /// Creates a code valid for [`INVITE_VALIDITY_SECS`] from now.
    pub fn create(group_id: &str, passphrase: &str, host: &str, port: u16) -> Result<String, InviteError> {
        let expires_at = now_secs() + INVITE_VALIDITY_SECS;
        Self::create_with_expiry(group_id, passphrase, host, port, expires_at)
    }

    /// Creates a code with an explicit expiry (seconds since the epoch).
    ///
    /// Group ids and hosts containing `|` cannot be encoded.
    pub fn create_with_expiry(
        group_id: &str,
        passphrase: &str,
        host: &str,
        port: u16,
        expires_at: u64,
    ) -> Result<String, InviteError> {
        if group_id.is_empty() || host.is_empty() {
            return Err(InviteError::Empty);
        }
        if group_id.contains('|') || host.contains('|') {
            return Err(InviteError::BadPayload);
        }
        let payload = format!("{group_id}|{host}|{port}|{expires_at}");
        let tag = mac(passphrase, payload.as_bytes())?.finalize().into_bytes();
        Ok(format!(
            "{INVITE_TAG}.{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verifies a code against the current time.
    pub fn parse_and_verify(code: &str, passphrase: &str) -> Result<Invite, InviteError> {
        Self::parse_and_verify_at(code, passphrase, now_secs())
    }

    /// Verifies a code as of `now` (seconds since the epoch).
    ///
    /// Checks run in order: shape, signature, payload fields, expiry. A code
    /// is still valid during its expiry second.
    pub fn parse_and_verify_at(code: &str, passphrase: &str, now: u64) -> Result<Invite, InviteError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(InviteError::Empty);
        }

        let parts: Vec<&str> = code.split('.').collect();
        let [tag, payload_b64, sig_b64] = parts.as_slice() else {
            return Err(InviteError::BadFormat);
        };
        if *tag != INVITE_TAG {
            return Err(InviteError::BadFormat);
        }
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| InviteError::BadFormat)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| InviteError::BadFormat)?;

        mac(passphrase, &payload)?
            .verify_slice(&sig)
            .map_err(|_| InviteError::BadSignature)?;

        let payload = String::from_utf8(payload).map_err(|_| InviteError::BadPayload)?;
        let fields: Vec<&str> = payload.split('|').collect();
        let [group_id, host, port, expires_at] = fields.as_slice() else {
            return Err(InviteError::BadPayload);
        };
        let port: u16 = port.parse().map_err(|_| InviteError::BadPayload)?;
        let expires_at: u64 = expires_at.parse().map_err(|_| InviteError::BadPayload)?;
        if group_id.is_empty() || host.is_empty() {
            return Err(InviteError::BadPayload);
        }

        if now > expires_at {
            return Err(InviteError::Expired);
        }

        Ok(Invite {
            group_id: group_id.to_string(),
            host: host.to_string(),
            port,
            expires_at,
        })
    }
}

fn mac(passphrase: &str, payload: &[u8]) -> Result<HmacSha256, InviteError> {
    let key = Sha256::digest(passphrase.as_bytes());
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(&key).map_err(|_| InviteError::BadSignature)?;
    mac.update(payload);
    Ok(mac)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Everything a new member needs to join, passphrase included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLink {
    pub gid: String,
    pub gp: String,
    #[serde(default)]
    pub seeds: Vec<String>,
}

impl JoinLink {
    /// Creates a link; seeds are canonicalized and invalid ones dropped.
    pub fn new(group_id: impl Into<String>, passphrase: impl Into<String>, seeds: &[String]) -> Self {
        Self {
            gid: group_id.into(),
            gp: passphrase.into(),
            seeds: seeds.iter().filter_map(|s| normalize_seed(s).ok()).collect(),
        }
    }

    /// Renders `budgetmesh://join#<b64url(json)>`.
    pub fn encode(&self) -> String {
        // A struct of strings always serializes.
        let json = serde_json::to_vec(self).unwrap_or_default();
        format!("{JOIN_LINK_PREFIX}{}", URL_SAFE_NO_PAD.encode(json))
    }

    /// Parses a link. The group id and passphrase are required.
    pub fn decode(link: &str) -> Result<Self, InviteError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(InviteError::Empty);
        }
        let encoded = link
            .strip_prefix(JOIN_LINK_PREFIX)
            .ok_or(InviteError::BadFormat)?;
        let json = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|_| InviteError::BadFormat)?;
        let mut parsed: JoinLink =
            serde_json::from_slice(&json).map_err(|_| InviteError::BadPayload)?;
        if parsed.gid.trim().is_empty() || parsed.gp.is_empty() {
            return Err(InviteError::BadPayload);
        }
        parsed.seeds = parsed
            .seeds
            .iter()
            .filter_map(|s| normalize_seed(s).ok())
            .collect();
        Ok(parsed)
    }
}
