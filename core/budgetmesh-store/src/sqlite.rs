//! SQLite-backed store.
//!
//! All kinds share one `records` table keyed by `(kind, key)`. The version
//! is stored as separate columns and compared in Rust, since the text form
//! of a stamp does not sort correctly.

use crate::error::{StorageError, StorageResult};
use crate::model::EntityKind;
use crate::store::{ReplicatedStore, Row};
use crate::version::{Version, should_replace};
use budgetmesh_types::Stamp;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Persistent [`ReplicatedStore`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), %mode, "opened record store");
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                wall INTEGER NOT NULL,
                counter INTEGER NOT NULL,
                node TEXT NOT NULL,
                author TEXT NOT NULL,
                body TEXT,
                PRIMARY KEY (kind, key)
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn read_version(conn: &Connection, kind: EntityKind, key: &str) -> StorageResult<Option<Version>> {
    let found = conn
        .query_row(
            "SELECT wall, counter, node, author FROM records WHERE kind = ?1 AND key = ?2",
            params![kind.as_str(), key],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    found
        .map(|(wall, counter, node, author)| to_version(wall, counter, node, author))
        .transpose()
}

fn to_version(wall: i64, counter: i64, node: String, author: String) -> StorageResult<Version> {
    let wall = u64::try_from(wall)
        .map_err(|_| StorageError::CorruptRow(format!("negative wall time {wall}")))?;
    let counter = u32::try_from(counter)
        .map_err(|_| StorageError::CorruptRow(format!("counter out of range {counter}")))?;
    Ok(Version::new(Stamp::new(wall, counter, node), author))
}

fn wall_column(stamp: &Stamp) -> StorageResult<i64> {
    i64::try_from(stamp.wall_time())
        .map_err(|_| StorageError::CorruptRow(format!("wall time too large {}", stamp.wall_time())))
}

struct RawRow {
    kind: String,
    key: String,
    wall: i64,
    counter: i64,
    node: String,
    author: String,
    body: Option<String>,
}

impl RawRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            key: row.get(1)?,
            wall: row.get(2)?,
            counter: row.get(3)?,
            node: row.get(4)?,
            author: row.get(5)?,
            body: row.get(6)?,
        })
    }

    fn into_row(self) -> StorageResult<Row> {
        let kind = EntityKind::parse(&self.kind)
            .ok_or_else(|| StorageError::CorruptRow(format!("unknown kind {:?}", self.kind)))?;
        Ok(Row {
            kind,
            key: self.key,
            version: to_version(self.wall, self.counter, self.node, self.author)?,
            body: self.body,
        })
    }
}

const SELECT_ROW: &str = "SELECT kind, key, wall, counter, node, author, body FROM records";

impl ReplicatedStore for SqliteStore {
    fn upsert_row(&self, row: Row) -> StorageResult<bool> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;

        let existing = read_version(&tx, row.kind, &row.key)?;
        if !should_replace(existing.as_ref(), &row.version) {
            trace!(kind = %row.kind, key = %row.key, "stale write ignored");
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO records (kind, key, wall, counter, node, author, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (kind, key) DO UPDATE SET
                wall = excluded.wall,
                counter = excluded.counter,
                node = excluded.node,
                author = excluded.author,
                body = excluded.body",
            params![
                row.kind.as_str(),
                row.key,
                wall_column(&row.version.stamp)?,
                i64::from(row.version.stamp.counter()),
                row.version.stamp.node(),
                row.version.author,
                row.body,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn get_row(&self, kind: EntityKind, key: &str) -> StorageResult<Option<Row>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = conn
            .query_row(
                &format!("{SELECT_ROW} WHERE kind = ?1 AND key = ?2"),
                params![kind.as_str(), key],
                RawRow::read,
            )
            .optional()?;
        raw.map(RawRow::into_row).transpose()
    }

    fn active_rows(&self, kind: EntityKind) -> StorageResult<Vec<Row>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(&format!(
            "{SELECT_ROW} WHERE kind = ?1 AND body IS NOT NULL"
        ))?;
        let raws = stmt.query_map(params![kind.as_str()], RawRow::read)?;

        let mut rows = Vec::new();
        for raw in raws {
            rows.push(raw?.into_row()?);
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}
