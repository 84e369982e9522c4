use thiserror::Error;

/// Storage-specific error types for the tagplay mapping store.
///
/// An unknown tag is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Query failed or no pooled connection was available
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations could not be applied
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// No row matched (e.g. unmapping a tag that has no mapping)
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Blank tag id or media reference
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (bad `DATABASE_URL`, unwritable directory)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem error while scanning the media directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a storage operation.
pub type StorageResult<T> = Result<T, StorageError>;
