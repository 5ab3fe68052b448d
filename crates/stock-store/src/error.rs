use common::{ProductId, Version};
use domain::StockError;
use thiserror::Error;

/// Errors that can occur when interacting with the stock repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored item changed since it was loaded.
    #[error(
        "Concurrency conflict for product {product_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        product_id: ProductId,
        expected: Version,
        actual: Version,
    },

    /// The product is not stored.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// The product is already stored.
    #[error("Product already exists: {0}")]
    AlreadyExists(ProductId),

    /// Stored counters violate the ledger invariants.
    #[error("Corrupt stock record for product {product_id}: {source}")]
    Corrupt {
        product_id: ProductId,
        #[source]
        source: StockError,
    },

    /// The batch cannot be written as a unit.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// The backing store is unavailable or refused the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying with freshly loaded items may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for stock repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
