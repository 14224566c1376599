use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A record body that does not match its kind.
    #[error("record body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("ledger directory: {0}")]
    Io(#[from] std::io::Error),

    /// A row whose columns are out of range for a version stamp or kind.
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}
