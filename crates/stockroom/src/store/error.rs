//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Upload job not found: {id}")]
    JobNotFound { id: String },

    /// A new category cannot be created without a processed primary image.
    #[error("Primary image is required for category: {category}")]
    PrimaryImageRequired { category: String },

    #[error("Invalid entity name: {name}")]
    InvalidName { name: String },

    #[error("Failed to serialize job tracking data: {0}")]
    Serialize(#[from] serde_json::Error),
}
