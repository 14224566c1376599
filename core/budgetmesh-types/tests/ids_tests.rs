use budgetmesh_types::{MemberId, RecordId};
use std::collections::HashSet;
use std::str::FromStr;

// ── RecordId ──────────────────────────────────────────────────────

#[test]
fn record_id_new_is_unique() {
    assert_ne!(RecordId::new(), RecordId::new());
}

#[test]
fn record_id_is_time_ordered() {
    let a = RecordId::new();
    let b = RecordId::new();
    assert!(a.as_uuid() < b.as_uuid());
}

#[test]
fn record_id_display_and_parse() {
    let id = RecordId::new();
    let parsed = RecordId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn record_id_parse_invalid() {
    assert!(RecordId::parse("not-a-uuid").is_err());
    assert!(RecordId::from_str("garbage").is_err());
}

#[test]
fn record_id_serializes_as_plain_string() {
    let id = RecordId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

// ── MemberId ──────────────────────────────────────────────────────

#[test]
fn member_id_new_is_unique() {
    assert_ne!(MemberId::new(), MemberId::new());
}

#[test]
fn member_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::new_v4();
    assert_eq!(MemberId::from_uuid(uuid).as_uuid(), uuid);
}

#[test]
fn member_id_from_str() {
    let id = MemberId::new();
    let parsed: MemberId = MemberId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn member_id_hash_and_eq() {
    let id = MemberId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn member_id_ordering_matches_string_ordering() {
    let mut ids: Vec<MemberId> = (0..16).map(|_| MemberId::new()).collect();
    let mut as_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    ids.sort();
    as_strings.sort();
    let sorted: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(sorted, as_strings);
}
