// Error taxonomy for store, vector, and query operations

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the symbol store, vector index, and hybrid retrieval.
///
/// Absence of data is never an error: lookups return `None` or an empty
/// collection. Everything here indicates either a caller bug (foreign key,
/// dimension) or a genuine engine failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist: unknown `parent_id` on a symbol
    /// upsert, or a missing endpoint on a relationship/binding insert.
    /// Not retried — the caller sent inconsistent data.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The vec0 module is not available on the current connection. Raised
    /// only after the one automatic re-register-and-retry has failed.
    #[error("vector extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// Vector length does not match the table's configured dimension.
    /// Fatal by design; vectors are never truncated or padded.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref cause, ref message) = err {
            if cause.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                let detail = message
                    .clone()
                    .unwrap_or_else(|| "referenced symbol does not exist".to_string());
                return StoreError::ForeignKeyViolation(detail);
            }
        }
        StoreError::Sqlite(err)
    }
}

impl StoreError {
    /// True when the underlying failure is the vec0 module missing from the
    /// connection, which warrants the single reload-and-retry.
    pub(crate) fn is_missing_vec_module(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(msg))) => {
                msg.contains("no such module: vec0") || msg.contains("no such table: vec0")
            }
            StoreError::Sqlite(rusqlite::Error::SqlInputError { msg, .. }) => {
                msg.contains("no such module: vec0")
            }
            _ => false,
        }
    }
}
