use thiserror::Error;

/// Storage-specific error types for the event receiver.
///
/// None of these ever reach the panel: the correlation pipeline logs them
/// and skips the affected stage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A statement was requested that cannot be expressed (no fields, no columns)
    #[error("Invalid statement on {table}: {reason}")]
    InvalidStatement { table: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Diagnostic event could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
