use domain::{OrderError, ProductId, UnknownStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured timeout.
    /// Retryable.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// A decrement would have taken the ledger below zero.
    #[error("Stock underflow for {product_id}: {available} available, {requested} requested")]
    StockUnderflow {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// A decrement targeted a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The commit was refused (failure injection in the in-memory store).
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// A stored order no longer satisfies the order invariants.
    #[error("Corrupt order row: {0}")]
    CorruptOrder(#[from] OrderError),

    /// A stored order status is not recognised.
    #[error("Corrupt order status: {0}")]
    CorruptStatus(#[from] UnknownStatus),

    /// A stored integer does not fit the domain type.
    #[error("Corrupt value in column {column}: {value}")]
    CorruptValue { column: &'static str, value: i64 },

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
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
