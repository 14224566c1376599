use budgetmesh_store::{
    CategoryBudget, Decimal, EntityKind, ReplicatedStore, ReplicatedStoreExt, SqliteStore, Version,
};
use budgetmesh_types::Stamp;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn budget(category: &str, limit: i64, wall: u64, author: &str) -> CategoryBudget {
    let mut b = CategoryBudget::new(category, Decimal::from(limit), "EUR");
    b.ver = Stamp::new(wall, 0, author);
    b.author = author.to_string();
    b
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.upsert_if_newer(&budget("Food", 150, 20, "bob")).unwrap();
        let v = Version::new(Stamp::new(9, 0, "a"), "a");
        store.tombstone_if_newer(EntityKind::CategoryBudget, "Rent", &v).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let food: CategoryBudget = store.get("Food").unwrap().unwrap();
    assert_eq!(food.monthly_limit, Decimal::from(150));
    assert_eq!(food.ver, Stamp::new(20, 0, "bob"));

    let rent = store.get_row(EntityKind::CategoryBudget, "Rent").unwrap().unwrap();
    assert!(rent.is_tombstone());
    // A stale write after restart must still lose to the persisted tombstone.
    assert!(!store.upsert_if_newer(&budget("Rent", 1, 8, "z")).unwrap());
}

#[test]
fn open_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a").join("b").join("ledger.db");
    SqliteStore::open(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn concurrent_writers_converge_on_greatest_version() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..50u64 {
                    let wall = i * 8 + t;
                    store
                        .upsert_if_newer(&budget("Food", wall as i64, wall, &format!("w{t}")))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let food: CategoryBudget = store.get("Food").unwrap().unwrap();
    assert_eq!(food.ver.wall_time(), 49 * 8 + 7);
    assert_eq!(food.monthly_limit, Decimal::from(49 * 8 + 7));
}

#[test]
fn large_wall_time_is_rejected_not_truncated() {
    let store = SqliteStore::open_in_memory().unwrap();
    let b = budget("Food", 1, u64::MAX, "a");
    assert!(store.upsert_if_newer(&b).is_err());
}
