//! Command line and session resolution for the BudgetMesh daemon.
//!
//! Kept apart from `main` so the precedence rules (join code, then flags,
//! then the restored session) can be tested without a network.

use anyhow::{Context, Result, bail};
use budgetmesh_sync::{
    DEFAULT_PORT, InviteCode, JoinLink, SeedBook, Session, TransportMode,
    invite::JOIN_LINK_PREFIX,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "budgetmesh-node")]
#[command(about = "Peer-to-peer shared budget ledger")]
pub struct Args {
    /// Directory for the ledger, identity and session files
    #[arg(long, default_value = "budgetmesh-data")]
    pub data_dir: PathBuf,

    /// Display name for a new identity
    #[arg(long)]
    pub name: Option<String>,

    /// Group id to join or create
    #[arg(long)]
    pub group: Option<String>,

    /// Group passphrase
    #[arg(long, env = "BUDGETMESH_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// UDP port (default 7800, or the restored session's)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seed endpoint, host:port or host[port]; repeatable
    #[arg(long = "seed")]
    pub seeds: Vec<String>,

    /// Invitation code or join link
    #[arg(long)]
    pub join: Option<String>,

    /// Print an invitation code once the public endpoint is known
    #[arg(long)]
    pub print_invite: bool,

    /// Skip gateway port mapping and STUN
    #[arg(long)]
    pub no_nat: bool,

    /// Forget the saved session before starting
    #[arg(long)]
    pub reset: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Everything needed to start a member.
#[derive(Clone, PartialEq, Eq)]
pub struct Plan {
    pub display_name: String,
    pub group_id: String,
    pub passphrase: String,
    pub port: u16,
    pub seeds: Vec<String>,
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("display_name", &self.display_name)
            .field("group_id", &self.group_id)
            .field("passphrase", &"[REDACTED]")
            .field("port", &self.port)
            .field("seeds", &self.seeds)
            .finish()
    }
}

impl Plan {
    /// Seeded when any seed is known, LAN discovery otherwise.
    pub fn transport_mode(&self) -> TransportMode {
        if self.seeds.is_empty() {
            TransportMode::LocalDiscovery
        } else {
            TransportMode::Seeded(self.seeds.clone())
        }
    }

    pub fn to_session(&self) -> Session {
        Session {
            display_name: self.display_name.clone(),
            group_id: self.group_id.clone(),
            port: self.port,
            seeds: self.seeds.clone(),
            passphrase: self.passphrase.clone(),
        }
    }
}

/// Merges the command line with the restored session.
///
/// A join link supplies group, passphrase and seeds. An invitation code
/// supplies group and seed but is verified with the passphrase from the
/// flags or the session. Otherwise flags override the session.
pub fn resolve(args: &Args, stored: Option<&Session>) -> Result<Plan> {
    let mut seeds = SeedBook::from_entries(stored.map(|s| s.seeds.as_slice()).unwrap_or_default());
    let mut group_id = args.group.clone().or_else(|| stored.map(|s| s.group_id.clone()));
    let mut passphrase = args
        .passphrase
        .clone()
        .or_else(|| stored.map(|s| s.passphrase.clone()));

    if let Some(code) = args.join.as_deref().map(str::trim) {
        if code.starts_with(JOIN_LINK_PREFIX) {
            let link = JoinLink::decode(code).context("join link refused")?;
            group_id = Some(link.gid);
            passphrase = Some(link.gp);
            for seed in &link.seeds {
                seeds.insert(seed)?;
            }
        } else {
            let Some(pass) = passphrase.as_deref() else {
                bail!("an invitation code needs the group passphrase (--passphrase)");
            };
            let invite =
                InviteCode::parse_and_verify(code, pass).context("invitation refused")?;
            seeds.insert(&invite.seed())?;
            group_id = Some(invite.group_id);
        }
    }

    for seed in &args.seeds {
        seeds
            .insert(seed)
            .with_context(|| format!("invalid seed {seed:?}"))?;
    }

    let (Some(group_id), Some(passphrase)) = (group_id, passphrase) else {
        bail!("no group configured: use --group and --passphrase, or --join");
    };
    if group_id.trim().is_empty() || passphrase.is_empty() {
        bail!("group id and passphrase must not be empty");
    }

    Ok(Plan {
        display_name: args
            .name
            .clone()
            .or_else(|| stored.map(|s| s.display_name.clone()))
            .unwrap_or_else(|| "member".to_string()),
        group_id,
        passphrase,
        port: args
            .port
            .or_else(|| stored.map(|s| s.port))
            .unwrap_or(DEFAULT_PORT),
        seeds: seeds.to_vec(),
    })
}
