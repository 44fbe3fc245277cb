use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row or advisory lock could not be acquired within the lock timeout.
    #[error("Lock wait timed out on {resource}")]
    Busy { resource: String },

    /// A unique constraint was violated.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A write would break a table constraint (negative stock, usage above limit).
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// A row that must exist for the write was missing.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The transaction was already committed or rolled back.
    #[error("Transaction already finished")]
    TransactionClosed,

    /// The backend refused the operation (used for injected faults in tests).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back to a record.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true when retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy { .. } | StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
