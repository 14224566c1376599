//! BudgetMesh peer daemon.
//!
//! Runs one member of a budget group: restores or creates the local
//! identity and session, opens the ledger, maps ports and learns the public
//! endpoint, then gossips with the rest of the group until interrupted.
//!
//! Usage:
//!   budgetmesh-node --group household --passphrase hunter2 --print-invite
//!   budgetmesh-node --join 'BUDP2P1....' --passphrase hunter2

use anyhow::{Context, Result};
use budgetmesh_crypto::{DEVICE_KEY_FILE, DeviceKey, generate_random_key};
use budgetmesh_node::{Args, Plan, resolve};
use budgetmesh_store::SqliteStore;
use budgetmesh_sync::{
    ChangeEvent, EngineConfig, GossipTransport, IdentityStore, InviteCode, JoinLink,
    LocalIdentity, NatBootstrap, NatReport, ReplicationEngine, SeedSink, SessionStore,
    TransportConfig,
};
use clap::Parser;
use std::{fs, sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LEDGER_FILE: &str = "ledger.db";
const REANNOUNCE_INTERVAL: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("BudgetMesh node starting...");
    fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("cannot create data dir {}", args.data_dir.display()))?;

    let device_key = DeviceKey::load_or_create(&args.data_dir.join(DEVICE_KEY_FILE)).unwrap_or_else(|e| {
        warn!("device key unavailable ({e}), the session will not survive a restart");
        DeviceKey::from_key(generate_random_key())
    });
    let sessions = Arc::new(SessionStore::new(&args.data_dir, device_key));
    if args.reset {
        if let Err(e) = sessions.clear() {
            warn!("could not clear session: {e}");
        }
    }
    let stored = sessions.load();
    let plan = resolve(&args, stored.as_ref())?;
    debug!(?plan, "resolved session");

    let identity = IdentityStore::new(&args.data_dir)
        .load_or_create(&plan.display_name)
        .unwrap_or_else(|e| {
            warn!("identity unavailable ({e}), using an ephemeral one");
            LocalIdentity::generate(plan.display_name.clone())
        });
    info!(member = %identity.member_id(), name = identity.display_name(), "identity ready");

    let store = SqliteStore::open(&args.data_dir.join(LEDGER_FILE)).context("cannot open ledger")?;

    if let Err(e) = sessions.save(&plan.to_session()) {
        warn!("could not save session: {e}");
    }

    let report = if args.no_nat {
        NatReport::default()
    } else {
        NatBootstrap::with_defaults().run(plan.port).await
    };

    let transport = Arc::new(GossipTransport::new(TransportConfig {
        bind_port: plan.port,
        mode: plan.transport_mode(),
        ..TransportConfig::default()
    }));
    let engine = Arc::new(
        ReplicationEngine::new(
            identity,
            EngineConfig::new(plan.group_id.clone(), plan.passphrase.clone()),
            Arc::new(store),
            transport,
        )
        .with_seeds(&plan.seeds)
        .with_seed_sink(sessions.clone() as Arc<dyn SeedSink>),
    );
    engine.start().await.context("cannot start replication")?;
    info!(port = plan.port, group = %plan.group_id, "gossip running");

    if let Some(addr) = report.public_addr {
        spawn_reannounce(&engine, addr.to_string());
    }

    if args.print_invite {
        print_invite(&plan, &report);
    }

    let mut events = engine.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ChangeEvent::Records(kind)) => info!(kind = kind.as_str(), "ledger changed"),
                Ok(ChangeEvent::Peers) => {
                    info!(peers = engine.transport().live_peers().len(), "peer set changed");
                }
                Err(RecvError::Lagged(n)) => debug!("skipped {n} change events"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    engine.stop();
    Ok(())
}

/// Announces the public endpoint now and again every few minutes, so
/// members that come online later still learn it.
fn spawn_reannounce(engine: &Arc<ReplicationEngine>, endpoint: String) {
    let weak = Arc::downgrade(engine);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REANNOUNCE_INTERVAL);
        loop {
            ticker.tick().await;
            let Some(engine) = weak.upgrade() else { break };
            match engine.announce(&endpoint).await {
                Ok(sent) => debug!(%endpoint, sent, "announced"),
                Err(e) => warn!("announce failed: {e}"),
            }
        }
    });
}

fn print_invite(plan: &Plan, report: &NatReport) {
    println!();
    println!("========================================");
    println!("  Group: {}", plan.group_id);
    match report.public_addr {
        Some(addr) => match InviteCode::create(
            &plan.group_id,
            &plan.passphrase,
            &addr.ip().to_string(),
            addr.port(),
        ) {
            Ok(code) => println!("  Invite (valid 1h): {code}"),
            Err(e) => warn!("could not create invite: {e}"),
        },
        None => println!("  No public endpoint; invite codes need one"),
    }
    let mut seeds = plan.seeds.clone();
    if let Some(addr) = report.public_addr {
        seeds.push(addr.to_string());
    }
    println!(
        "  Join link: {}",
        JoinLink::new(&plan.group_id, &plan.passphrase, &seeds).encode()
    );
    println!("========================================");
    println!();
}
