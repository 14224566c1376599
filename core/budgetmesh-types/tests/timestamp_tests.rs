use budgetmesh_types::Stamp;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_from_components() {
    let ts = Stamp::new(42, 7, "alice");
    assert_eq!(ts.wall_time(), 42);
    assert_eq!(ts.counter(), 7);
    assert_eq!(ts.node(), "alice");
}

#[test]
fn default_is_zero() {
    let ts = Stamp::default();
    assert!(ts.is_zero());
    assert!(ts < Stamp::new(1, 0, ""));
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn ordering_by_wall_time() {
    assert!(Stamp::new(100, 9, "z") < Stamp::new(200, 0, "a"));
}

#[test]
fn ordering_by_counter_when_wall_time_equal() {
    assert!(Stamp::new(100, 0, "z") < Stamp::new(100, 1, "a"));
}

#[test]
fn ordering_by_node_when_wall_and_counter_equal() {
    let alice = Stamp::new(100, 3, "alice");
    let bob = Stamp::new(100, 3, "bob");
    assert!(alice < bob);
    assert!(bob.is_after(&alice));
    assert!(alice.is_before(&bob));
}

#[test]
fn equal_stamps() {
    let a = Stamp::new(100, 5, "n");
    let b = Stamp::new(100, 5, "n");
    assert_eq!(a, b);
    assert!(!a.is_before(&b));
    assert!(!a.is_after(&b));
}

// ── Text form ────────────────────────────────────────────────────

#[test]
fn display_is_wall_counter_node() {
    assert_eq!(Stamp::new(1700000000000, 2, "abc").to_string(), "1700000000000:2:abc");
}

#[test]
fn parse_roundtrip() {
    let ts = Stamp::new(1234567890, 42, "5f0c6a8e-2d1b-4f3e-9a77-0c1d2e3f4a5b");
    let parsed: Stamp = ts.to_string().parse().unwrap();
    assert_eq!(ts, parsed);
}

#[test]
fn parse_keeps_colons_in_node() {
    let parsed: Stamp = "5:1:host:7800".parse().unwrap();
    assert_eq!(parsed.node(), "host:7800");
}

#[test]
fn parse_empty_is_zero() {
    let parsed: Stamp = "".parse().unwrap();
    assert!(parsed.is_zero());
}

#[test]
fn parse_rejects_garbage() {
    assert!("nonsense".parse::<Stamp>().is_err());
    assert!("x:1:n".parse::<Stamp>().is_err());
    assert!("1:-1:n".parse::<Stamp>().is_err());
    assert!("1:2".parse::<Stamp>().is_err());
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serializes_as_string() {
    let ts = Stamp::new(10, 1, "n1");
    assert_eq!(serde_json::to_string(&ts).unwrap(), "\"10:1:n1\"");
}

#[test]
fn serialization_roundtrip() {
    let ts = Stamp::new(1234567890, 42, "node");
    let json = serde_json::to_string(&ts).unwrap();
    let parsed: Stamp = serde_json::from_str(&json).unwrap();
    assert_eq!(ts, parsed);
}

#[test]
fn deserialize_empty_string_is_zero() {
    let parsed: Stamp = serde_json::from_str("\"\"").unwrap();
    assert!(parsed.is_zero());
}

// ── Hash ─────────────────────────────────────────────────────────

#[test]
fn hash_consistent_with_eq() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(Stamp::new(100, 5, "n"));
    set.insert(Stamp::new(100, 5, "n"));
    assert_eq!(set.len(), 1);
}
