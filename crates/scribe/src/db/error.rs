use std::path::PathBuf;
use thiserror::Error;

/// Failures of the job database itself, below the job store's contract.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory holding the database file could not be created.
    #[error("Cannot prepare database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration v{version} ({description}) failed: {reason}")]
    Migration {
        version: u32,
        description: &'static str,
        reason: String,
    },

    /// A table name that cannot be interpolated into a PRAGMA safely.
    #[error("Refusing to inspect table '{0}': not a plain identifier")]
    InvalidIdentifier(String),

    #[error("Job database lock poisoned")]
    LockPoisoned,
}
