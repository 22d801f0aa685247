use thiserror::Error;

/// Errors that can occur when reading or writing indexer state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The store refused the operation because it is unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be represented in the store's column type.
    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
