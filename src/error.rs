use thiserror::Error;

/// Errors produced by the database layer.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("Database connection lock poisoned")]
    Poisoned,

    /// The blocking task running the query was cancelled or panicked.
    #[error("Database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }
}

/// Convenience alias used by every DAO.
pub type DbResult<T> = std::result::Result<T, DbError>;
