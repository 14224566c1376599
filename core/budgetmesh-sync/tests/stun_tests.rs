use budgetmesh_sync::nat::stun::{
    BINDING_SUCCESS, MAGIC_COOKIE, TransactionId, XOR_MAPPED_ADDRESS, build_binding_request,
    parse_binding_response,
};
use budgetmesh_sync::nat::{NatBootstrap, PortMapper, Protocol};
use budgetmesh_sync::{StunClient, StunConfig};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;

const TXID: TransactionId = [7; 12];

fn xor_mapped_v4(addr: SocketAddrV4) -> Vec<u8> {
    let port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    let ip = u32::from(*addr.ip()) ^ MAGIC_COOKIE;
    let mut attr = Vec::new();
    attr.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
    attr.extend_from_slice(&8u16.to_be_bytes());
    attr.extend_from_slice(&[0, 0x01]);
    attr.extend_from_slice(&port.to_be_bytes());
    attr.extend_from_slice(&ip.to_be_bytes());
    attr
}

fn response(msg_type: u16, cookie: u32, txid: &TransactionId, attrs: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&msg_type.to_be_bytes());
    buf.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    buf.extend_from_slice(&cookie.to_be_bytes());
    buf.extend_from_slice(txid);
    buf.extend_from_slice(attrs);
    buf
}

fn mapped() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 54_321)
}

// ── Codec ────────────────────────────────────────────────────────

#[test]
fn binding_request_layout() {
    let req = build_binding_request(&TXID);
    assert_eq!(&req[0..2], &[0x00, 0x01]);
    assert_eq!(&req[2..4], &[0x00, 0x00]);
    assert_eq!(&req[4..8], &[0x21, 0x12, 0xA4, 0x42]);
    assert_eq!(&req[8..20], &TXID);
}

#[test]
fn parses_xor_mapped_ipv4() {
    let buf = response(BINDING_SUCCESS, MAGIC_COOKIE, &TXID, &xor_mapped_v4(mapped()));
    assert_eq!(parse_binding_response(&buf, &TXID), Some(mapped()));
}

#[test]
fn skips_unrelated_attributes_with_padding() {
    // SOFTWARE attribute, 5 bytes of value padded to 8.
    let mut attrs = vec![0x80, 0x22, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0, 0, 0];
    attrs.extend(xor_mapped_v4(mapped()));
    let buf = response(BINDING_SUCCESS, MAGIC_COOKIE, &TXID, &attrs);
    assert_eq!(parse_binding_response(&buf, &TXID), Some(mapped()));
}

#[test]
fn rejects_wrong_cookie_txid_or_type() {
    let attrs = xor_mapped_v4(mapped());
    let other: TransactionId = [9; 12];
    assert_eq!(
        parse_binding_response(&response(BINDING_SUCCESS, 0xDEAD_BEEF, &TXID, &attrs), &TXID),
        None
    );
    assert_eq!(
        parse_binding_response(&response(BINDING_SUCCESS, MAGIC_COOKIE, &other, &attrs), &TXID),
        None
    );
    assert_eq!(
        parse_binding_response(&response(0x0111, MAGIC_COOKIE, &TXID, &attrs), &TXID),
        None
    );
}

#[test]
fn ipv6_only_response_yields_nothing() {
    let mut attr = Vec::new();
    attr.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
    attr.extend_from_slice(&20u16.to_be_bytes());
    attr.extend_from_slice(&[0, 0x02, 0x12, 0x34]);
    attr.extend_from_slice(&[0xAB; 16]);
    let buf = response(BINDING_SUCCESS, MAGIC_COOKIE, &TXID, &attr);
    assert_eq!(parse_binding_response(&buf, &TXID), None);
}

#[test]
fn truncated_responses_yield_nothing() {
    let buf = response(BINDING_SUCCESS, MAGIC_COOKIE, &TXID, &xor_mapped_v4(mapped()));
    for len in [0, 10, 19, 24, 30] {
        assert_eq!(parse_binding_response(&buf[..len], &TXID), None, "len {len}");
    }
}

// ── Client ───────────────────────────────────────────────────────

/// Answers one binding request with a fixed mapped address.
async fn fake_responder(answer: SocketAddrV4) -> String {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let (len, from) = socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 20);
        let txid: TransactionId = buf[8..20].try_into().unwrap();
        let reply = response(BINDING_SUCCESS, MAGIC_COOKIE, &txid, &xor_mapped_v4(answer));
        socket.send_to(&reply, from).await.unwrap();
    });
    addr.to_string()
}

#[tokio::test]
async fn client_queries_responder() {
    let server = fake_responder(mapped()).await;
    let client = StunClient::new(StunConfig {
        servers: vec![server],
        timeout: Duration::from_secs(2),
    });
    assert_eq!(client.query(0).await, Some(mapped()));
}

#[tokio::test]
async fn client_falls_through_silent_and_unresolvable_servers() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server = fake_responder(mapped()).await;
    let client = StunClient::new(StunConfig {
        servers: vec![
            "no-such-host.invalid:3478".into(),
            silent.local_addr().unwrap().to_string(),
            server,
        ],
        timeout: Duration::from_millis(200),
    });
    assert_eq!(client.query(0).await, Some(mapped()));
}

#[tokio::test]
async fn client_without_answers_returns_none() {
    let client = StunClient::new(StunConfig {
        servers: vec![],
        timeout: Duration::from_millis(50),
    });
    assert_eq!(client.query(0).await, None);
}

// ── Bootstrap ────────────────────────────────────────────────────

#[derive(Default)]
struct CountingMapper {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PortMapper for CountingMapper {
    async fn map_port(&self, _port: u16, protocol: Protocol) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        protocol == Protocol::Udp
    }
}

#[tokio::test]
async fn bootstrap_maps_both_protocols_then_asks_stun() {
    let server = fake_responder(mapped()).await;
    let mapper = Arc::new(CountingMapper::default());
    let nat = NatBootstrap::new(
        Some(mapper.clone() as Arc<dyn PortMapper>),
        StunClient::new(StunConfig {
            servers: vec![server],
            timeout: Duration::from_secs(2),
        }),
    );

    let report = nat.run(0).await;
    assert_eq!(mapper.calls.load(Ordering::SeqCst), 2);
    assert!(!report.mapped_tcp);
    assert!(report.mapped_udp);
    assert_eq!(report.public_addr, Some(mapped()));
    assert!(report.has_public());
}

#[tokio::test]
async fn bootstrap_without_mapper_or_stun_reports_nothing() {
    let nat = NatBootstrap::new(
        None,
        StunClient::new(StunConfig {
            servers: vec![],
            timeout: Duration::from_millis(10),
        }),
    );
    let report = nat.run(0).await;
    assert!(!report.mapped_tcp && !report.mapped_udp);
    assert!(!report.has_public());
}
