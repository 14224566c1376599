//! The replicated store contract.
//!
//! [`ReplicatedStore`] works on raw rows so it can be used as a trait
//! object; [`ReplicatedStoreExt`] layers typed access on top.

use crate::error::StorageResult;
use crate::model::{EntityKind, Replicated};
use crate::version::Version;

/// One stored record in serialized form. `body` is `None` for a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub kind: EntityKind,
    pub key: String,
    pub version: Version,
    pub body: Option<String>,
}

impl Row {
    /// Serializes a record. Deleted records become tombstone rows.
    pub fn from_record<R: Replicated>(record: &R) -> StorageResult<Self> {
        let body = if record.is_deleted() {
            None
        } else {
            Some(serde_json::to_string(record)?)
        };
        Ok(Self {
            kind: R::KIND,
            key: record.key(),
            version: record.version(),
            body,
        })
    }

    /// A tombstone row.
    pub fn tombstone(kind: EntityKind, key: impl Into<String>, version: Version) -> Self {
        Self {
            kind,
            key: key.into(),
            version,
            body: None,
        }
    }

    /// Returns true if this row is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.body.is_none()
    }

    /// Deserializes a live row. Tombstones yield `None`.
    pub fn decode<R: Replicated>(&self) -> StorageResult<Option<R>> {
        match &self.body {
            Some(body) => Ok(Some(serde_json::from_str(body)?)),
            None => Ok(None),
        }
    }
}

/// Storage with last-writer-wins semantics per (kind, key).
///
/// Every write is a compare-and-write: it lands only if its version is
/// strictly greater than what is stored, so re-delivery is a no-op and the
/// final state does not depend on arrival order.
pub trait ReplicatedStore: Send + Sync {
    /// Writes `row` if it is newer than the stored row. Returns whether it
    /// was written.
    fn upsert_row(&self, row: Row) -> StorageResult<bool>;

    /// Replaces the stored row with a tombstone if `version` is newer.
    fn tombstone_if_newer(
        &self,
        kind: EntityKind,
        key: &str,
        version: &Version,
    ) -> StorageResult<bool> {
        self.upsert_row(Row::tombstone(kind, key, version.clone()))
    }

    /// Reads the row for `key`, tombstones included.
    fn get_row(&self, kind: EntityKind, key: &str) -> StorageResult<Option<Row>>;

    /// All live rows of `kind`, in no particular order.
    fn active_rows(&self, kind: EntityKind) -> StorageResult<Vec<Row>>;
}

/// Typed access to a [`ReplicatedStore`].
pub trait ReplicatedStoreExt: ReplicatedStore {
    /// Writes `record` if it is newer. A deleted record is stored as a
    /// tombstone.
    fn upsert_if_newer<R: Replicated>(&self, record: &R) -> StorageResult<bool> {
        self.upsert_row(Row::from_record(record)?)
    }

    /// Reads a live record. Missing and tombstoned keys are `None`.
    fn get<R: Replicated>(&self, key: &str) -> StorageResult<Option<R>> {
        match self.get_row(R::KIND, key)? {
            Some(row) => row.decode(),
            None => Ok(None),
        }
    }

    /// All live records of type `R`, in display order.
    fn list_active<R: Replicated>(&self) -> StorageResult<Vec<R>> {
        let mut records = Vec::new();
        for row in self.active_rows(R::KIND)? {
            if let Some(record) = row.decode::<R>()? {
                records.push(record);
            }
        }
        records.sort_by(R::order);
        Ok(records)
    }
}

impl<S: ReplicatedStore + ?Sized> ReplicatedStoreExt for S {}
