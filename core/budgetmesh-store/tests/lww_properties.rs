//! Convergence properties: any delivery order and any amount of
//! re-delivery yields the same final state.

use budgetmesh_store::{
    CategoryBudget, Decimal, EntityKind, MemoryStore, ReplicatedStore, ReplicatedStoreExt, Row,
    SqliteStore, Version,
};
use budgetmesh_types::Stamp;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Write {
    Put { key: u8, limit: u32, wall: u64, counter: u32, author: u8 },
    Delete { key: u8, wall: u64, counter: u32, author: u8 },
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        3 => (0u8..4, 0u32..1000, 0u64..20, 0u32..3, 0u8..3).prop_map(
            |(key, limit, wall, counter, author)| Write::Put { key, limit, wall, counter, author }
        ),
        1 => (0u8..4, 0u64..20, 0u32..3, 0u8..3).prop_map(
            |(key, wall, counter, author)| Write::Delete { key, wall, counter, author }
        ),
    ]
}

fn apply(store: &dyn ReplicatedStore, write: &Write) {
    match write {
        Write::Put { key, limit, wall, counter, author } => {
            let author = format!("m{author}");
            let mut b = CategoryBudget::new(format!("c{key}"), Decimal::from(*limit), "EUR");
            b.ver = Stamp::new(*wall, *counter, author.clone());
            b.author = author;
            store.upsert_if_newer(&b).unwrap();
        }
        Write::Delete { key, wall, counter, author } => {
            let author = format!("m{author}");
            let v = Version::new(Stamp::new(*wall, *counter, author.clone()), author);
            store
                .tombstone_if_newer(EntityKind::CategoryBudget, &format!("c{key}"), &v)
                .unwrap();
        }
    }
}

fn snapshot(store: &dyn ReplicatedStore) -> Vec<Option<Row>> {
    (0..4u8)
        .map(|k| store.get_row(EntityKind::CategoryBudget, &format!("c{k}")).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn delivery_order_does_not_matter(
        writes in prop::collection::vec(write_strategy(), 0..40),
        seed in any::<u64>(),
    ) {
        // Two writes with the same version but different content cannot be
        // produced by a correct clock; keep them out of the input.
        let mut seen = std::collections::HashSet::new();
        let writes: Vec<Write> = writes
            .into_iter()
            .filter(|w| {
                let (key, wall, counter, author) = match w {
                    Write::Put { key, wall, counter, author, .. }
                    | Write::Delete { key, wall, counter, author } => (*key, *wall, *counter, *author),
                };
                seen.insert((key, wall, counter, author))
            })
            .collect();

        let forward = MemoryStore::new();
        for w in &writes {
            apply(&forward, w);
        }

        let mut shuffled = writes.clone();
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let other = SqliteStore::open_in_memory().unwrap();
        for w in shuffled.iter().chain(writes.iter().rev()) {
            apply(&other, w);
        }

        prop_assert_eq!(snapshot(&forward), snapshot(&other));
    }

    #[test]
    fn redelivery_is_idempotent(writes in prop::collection::vec(write_strategy(), 1..20)) {
        let once = MemoryStore::new();
        let twice = MemoryStore::new();
        for w in &writes {
            apply(&once, w);
            apply(&twice, w);
            apply(&twice, w);
        }
        prop_assert_eq!(snapshot(&once), snapshot(&twice));
    }
}
