use budgetmesh_store::{
    Category, CategoryBudget, Decimal, EntityKind, Expense, FxRate, Goal, Member, Period, Record,
    RecurringRule, Replicated, RolloverMode, Rule, RuleKind, Tombstone,
};
use budgetmesh_types::Stamp;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cmp::Ordering;

#[test]
fn expense_json_shape() {
    let mut e = Expense::new("alice", "Food", Decimal::new(1250, 2), "EUR", 1_700_000_000_000)
        .with_note("lunch");
    e.id = "e1".into();
    e.ver = Stamp::new(5, 1, "alice");
    e.author = "alice".into();

    let value = serde_json::to_value(&e).unwrap();
    assert_eq!(
        value,
        json!({
            "id": "e1",
            "who": "alice",
            "category": "Food",
            "amount": "12.50",
            "currency": "EUR",
            "note": "lunch",
            "ts": 1_700_000_000_000u64,
            "ver": "5:1:alice",
            "author": "alice",
            "deleted": false
        })
    );
}

#[test]
fn missing_metadata_defaults_to_unstamped() {
    let e: Expense = serde_json::from_value(json!({
        "who": "bob", "category": "Food", "amount": 3, "currency": "EUR", "ts": 1
    }))
    .unwrap();
    assert!(e.id.is_empty());
    assert!(e.ver.is_zero());
    assert!(!e.deleted);
    assert_eq!(e.amount, Decimal::from(3));
}

#[test]
fn budget_uses_screaming_rollover_mode() {
    let mut b = CategoryBudget::new("Food", Decimal::from(100), "EUR");
    b.rollover_mode = RolloverMode::Surplus;
    b.rollover_cap = Some(Decimal::from(50));
    let value = serde_json::to_value(&b).unwrap();
    assert_eq!(value["rolloverMode"], "SURPLUS");
    assert_eq!(value["monthlyLimit"], "100");
    assert_eq!(value["rolloverCap"], "50");
}

#[test]
fn rule_and_recurring_defaults() {
    let r: Rule = serde_json::from_value(json!({
        "name": "coffee", "pattern": "starbucks", "category": "Food"
    }))
    .unwrap();
    assert_eq!(r.kind, RuleKind::Substring);
    assert!(r.active);

    let rr: RecurringRule = serde_json::from_value(json!({
        "name": "rent", "period": "YEARLY", "day": 1, "month": 4,
        "amount": "900", "currency": "EUR", "category": "Home"
    }))
    .unwrap();
    assert_eq!(rr.period, Period::Yearly);
    assert_eq!(rr.month, 4);
    assert!(rr.active);
}

// ── Keys ─────────────────────────────────────────────────────────

#[test]
fn prepare_key_assigns_ids_once() {
    let mut e = Expense::new("a", "Food", Decimal::ONE, "EUR", 1);
    e.prepare_key();
    let first = e.id.clone();
    assert!(!first.is_empty());
    e.prepare_key();
    assert_eq!(e.id, first);
}

#[test]
fn prepare_key_canonicalizes_natural_keys() {
    let mut fx = FxRate::new(" usd ", Decimal::new(108, 2));
    fx.prepare_key();
    assert_eq!(fx.key(), "USD");

    let mut c = Category::new("  Food ");
    c.prepare_key();
    assert_eq!(c.key(), "Food");
}

#[test]
fn natural_keys() {
    assert_eq!(CategoryBudget::new("Food", Decimal::ONE, "EUR").key(), "Food");
    assert_eq!(Member::new("m1", "Alice").key(), "m1");
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn goal_without_due_date_sorts_last() {
    let mk = |name: &str, due: Option<u64>| Goal {
        id: name.into(),
        name: name.into(),
        target: Decimal::ONE,
        currency: "EUR".into(),
        due_ts: due,
        ver: Stamp::zero(),
        author: String::new(),
        deleted: false,
    };
    let someday = mk("bike", None);
    let soon = mk("trip", Some(10));
    assert_eq!(Goal::order(&soon, &someday), Ordering::Less);
}

#[test]
fn member_order_is_name_then_id() {
    let a = Member::new("2", "Alice");
    let b = Member::new("1", "Bob");
    let a2 = Member::new("1", "Alice");
    assert_eq!(Member::order(&a, &b), Ordering::Less);
    assert_eq!(Member::order(&a2, &a), Ordering::Less);
}

// ── Record / kinds ───────────────────────────────────────────────

#[test]
fn record_dispatch_matches_inner() {
    let mut fx = FxRate::new("GBP", Decimal::new(86, 2));
    fx.ver = Stamp::new(3, 0, "n");
    fx.author = "n".into();
    let record = Record::from(fx.clone());
    assert_eq!(record.kind(), EntityKind::FxRate);
    assert_eq!(record.key(), "GBP");
    assert_eq!(record.version(), fx.version());
    assert!(!record.is_deleted());
}

#[test]
fn record_restamp_overwrites_metadata() {
    let mut record = Record::from(Category::new("Food"));
    record.restamp(Stamp::new(9, 2, "me"), "me");
    assert_eq!(record.version().stamp, Stamp::new(9, 2, "me"));
    assert_eq!(record.version().author, "me");
}

#[test]
fn kind_names_roundtrip() {
    for kind in EntityKind::ALL {
        assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(EntityKind::parse("ledger"), None);
}

#[test]
fn tombstone_json_shape() {
    let t = Tombstone {
        key: "Food".into(),
        ver: Stamp::new(7, 0, "bob"),
        author: "bob".into(),
    };
    assert_eq!(
        serde_json::to_value(&t).unwrap(),
        json!({"key": "Food", "ver": "7:0:bob", "author": "bob"})
    );
}

#[test]
fn canonicalize_key_never_invents_an_id() {
    let mut e = Expense::new("a", "Food", Decimal::ONE, "EUR", 1);
    e.id = "  ".to_string();
    e.canonicalize_key();
    assert_eq!(e.id, "");

    let mut fx = FxRate::new("usd", Decimal::ONE);
    fx.canonicalize_key();
    assert_eq!(fx.key(), "USD");
}

#[test]
fn canonical_key_per_kind() {
    assert_eq!(EntityKind::FxRate.canonical_key(" chf "), "CHF");
    assert_eq!(EntityKind::Category.canonical_key(" Food "), "Food");
    assert_eq!(EntityKind::Expense.canonical_key("   "), "");
}
