//! In-memory store, for tests and ephemeral nodes.

use crate::error::StorageResult;
use crate::model::EntityKind;
use crate::store::{ReplicatedStore, Row};
use crate::version::should_replace;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A [`ReplicatedStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(EntityKind, String), Row>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReplicatedStore for MemoryStore {
    fn upsert_row(&self, row: Row) -> StorageResult<bool> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = (row.kind, row.key.clone());
        if !should_replace(rows.get(&slot).map(|r| &r.version), &row.version) {
            return Ok(false);
        }
        rows.insert(slot, row);
        Ok(true)
    }

    fn get_row(&self, kind: EntityKind, key: &str) -> StorageResult<Option<Row>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(&(kind, key.to_string())).cloned())
    }

    fn active_rows(&self, kind: EntityKind) -> StorageResult<Vec<Row>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .values()
            .filter(|r| r.kind == kind && !r.is_tombstone())
            .cloned()
            .collect())
    }
}
