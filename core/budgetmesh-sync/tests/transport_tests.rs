use budgetmesh_sync::gossip::Frame;
use budgetmesh_sync::gossip::DEFAULT_MULTICAST_GROUP;
use budgetmesh_sync::{GossipTransport, PeerEvent, TransportConfig, TransportMode, normalize_seed};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

fn config(mode: TransportMode) -> TransportConfig {
    TransportConfig {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        bind_port: 0,
        mode,
        heartbeat_interval: Duration::from_millis(50),
        peer_timeout: Duration::from_millis(300),
        ..TransportConfig::default()
    }
}

fn seed_of(addr: SocketAddr) -> String {
    normalize_seed(&addr.to_string()).unwrap()
}

async fn next_joined(events: &mut Receiver<PeerEvent>) -> SocketAddr {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            PeerEvent::Joined(addr) => return addr,
            PeerEvent::Left(_) => continue,
        }
    }
}

/// A listens with no seeds; B seeds A.
async fn pair() -> (GossipTransport, GossipTransport, SocketAddr, SocketAddr) {
    let a = GossipTransport::new(config(TransportMode::Seeded(vec![])));
    let a_addr = a.start().await.unwrap();
    let b = GossipTransport::new(config(TransportMode::Seeded(vec![seed_of(a_addr)])));
    let b_addr = b.start().await.unwrap();
    (a, b, a_addr, b_addr)
}

#[tokio::test]
async fn seeded_peers_exchange_data_both_ways() {
    let (a, b, a_addr, b_addr) = pair().await;
    let mut a_in = a.take_inbound().unwrap();
    let mut b_in = b.take_inbound().unwrap();
    let mut a_events = a.take_peer_events().unwrap();

    assert_eq!(b.broadcast(b"from b").await.unwrap(), 1);
    let got = timeout(WAIT, a_in.recv()).await.unwrap().unwrap();
    assert_eq!(got.payload, b"from b");
    assert_eq!(got.from, b_addr);

    // A has no seeds; it reaches B once B's heartbeats make it present.
    assert_eq!(next_joined(&mut a_events).await, b_addr);
    assert!(a.broadcast(b"from a").await.unwrap() >= 1);
    let got = timeout(WAIT, b_in.recv()).await.unwrap().unwrap();
    assert_eq!(got.payload, b"from a");
    assert_eq!(got.from, a_addr);

    a.stop();
    b.stop();
}

#[tokio::test]
async fn silent_peer_leaves_after_timeout() {
    let (a, b, _, b_addr) = pair().await;
    let mut a_events = a.take_peer_events().unwrap();
    assert_eq!(next_joined(&mut a_events).await, b_addr);

    b.stop();
    let left = timeout(WAIT, async {
        loop {
            if let Some(PeerEvent::Left(addr)) = a_events.recv().await {
                return addr;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(left, b_addr);
    assert!(a.live_peers().is_empty());
    a.stop();
}

#[tokio::test]
async fn own_heartbeats_are_not_presence() {
    let t = GossipTransport::new(config(TransportMode::Seeded(vec![])));
    let addr = t.start().await.unwrap();
    t.add_seed(&addr.to_string()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(t.live_peers().is_empty());
    t.stop();
}

#[tokio::test]
async fn add_seed_extends_discovery_without_rebinding() {
    let b = GossipTransport::new(config(TransportMode::Seeded(vec![])));
    let b_addr = b.start().await.unwrap();
    let mut b_in = b.take_inbound().unwrap();

    let a = GossipTransport::new(config(TransportMode::LocalDiscovery));
    let a_addr = a.start().await.unwrap();
    assert!(a.seeds().await.is_empty());

    assert!(a.add_seed(&b_addr.to_string()).await.unwrap());
    assert!(!a.add_seed(&seed_of(b_addr)).await.unwrap());
    assert_eq!(a.seeds().await, vec![seed_of(b_addr)]);
    assert_eq!(a.local_addr(), Some(a_addr));

    assert!(a.broadcast(b"hello").await.unwrap() >= 1);
    let got = timeout(WAIT, b_in.recv()).await.unwrap().unwrap();
    assert_eq!(got.from, a_addr);

    a.stop();
    b.stop();
}

#[tokio::test]
async fn discovery_keeps_multicast_group_after_learning_a_seed() {
    let a = GossipTransport::new(config(TransportMode::LocalDiscovery));
    a.start().await.unwrap();
    let group = SocketAddr::from((DEFAULT_MULTICAST_GROUP, 0));
    assert_eq!(a.targets().await, vec![group]);

    a.add_seed("127.0.0.1:7011").await.unwrap();
    let targets = a.targets().await;
    assert!(targets.contains(&group), "multicast dropped: {targets:?}");
    assert!(targets.contains(&"127.0.0.1:7011".parse().unwrap()));
    a.stop();
}

#[tokio::test]
async fn add_seed_before_start_keeps_configured_mode() {
    let t = GossipTransport::new(config(TransportMode::LocalDiscovery));
    assert!(t.add_seed("10.0.0.9:7000").await.unwrap());
    t.start().await.unwrap();
    assert_eq!(t.seeds().await, vec!["10.0.0.9[7000]"]);
    assert!(t.targets().await.contains(&SocketAddr::from((DEFAULT_MULTICAST_GROUP, 0))));
    t.stop();
}

#[tokio::test]
async fn reconfigure_keeps_channels() {
    let (a, b, a_addr, _) = pair().await;
    let mut a_in = a.take_inbound().unwrap();

    b.reconfigure(TransportMode::Seeded(vec![])).await.unwrap();
    assert!(b.seeds().await.is_empty());
    b.reconfigure(TransportMode::Seeded(vec![a_addr.to_string()]))
        .await
        .unwrap();

    b.broadcast(b"after swap").await.unwrap();
    let got = timeout(WAIT, a_in.recv()).await.unwrap().unwrap();
    assert_eq!(got.payload, b"after swap");
    a.stop();
    b.stop();
}

#[tokio::test]
async fn reconfigure_before_start_wins() {
    let t = GossipTransport::new(config(TransportMode::LocalDiscovery));
    t.reconfigure(TransportMode::Seeded(vec!["10.0.0.9:7000".into()]))
        .await
        .unwrap();
    t.start().await.unwrap();
    assert_eq!(t.seeds().await, vec!["10.0.0.9[7000]"]);
    t.stop();
}

#[tokio::test]
async fn unframed_datagrams_are_ignored() {
    let t = GossipTransport::new(config(TransportMode::Seeded(vec![])));
    let addr = t.start().await.unwrap();
    let mut inbound = t.take_inbound().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"hello", addr).await.unwrap();
    raw.send_to(&Frame::Data(b"framed").encode(), addr)
        .await
        .unwrap();

    let got = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(got.payload, b"framed");
    assert_eq!(got.from, raw.local_addr().unwrap());
    t.stop();
}

#[tokio::test]
async fn streams_can_be_taken_once() {
    let t = GossipTransport::new(TransportConfig::default());
    assert!(t.take_inbound().is_some());
    assert!(t.take_inbound().is_none());
    assert!(t.take_peer_events().is_some());
    assert!(t.take_peer_events().is_none());
}

#[tokio::test]
async fn broadcast_when_stopped_is_a_soft_drop() {
    let t = GossipTransport::new(config(TransportMode::Seeded(vec![])));
    assert!(!t.is_running());
    assert_eq!(t.broadcast(b"x").await.unwrap(), 0);

    let first = t.start().await.unwrap();
    assert_eq!(t.start().await.unwrap(), first);
    assert!(t.is_running());

    t.stop();
    assert!(!t.is_running());
    assert_eq!(t.broadcast(b"x").await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_payload_is_refused() {
    let t = GossipTransport::new(TransportConfig {
        max_datagram: 64,
        ..config(TransportMode::Seeded(vec![]))
    });
    t.start().await.unwrap();
    assert!(t.broadcast(&[0u8; 128]).await.is_err());
    t.stop();
}
