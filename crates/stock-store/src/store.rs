use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use domain::StockItem;

use crate::{Result, StoreError};

/// Persistence contract for stock items.
///
/// Items are loaded, mutated through the ledger rules and written back. Every
/// write is conditional on the version the item was loaded at, so two writers
/// racing on the same product cannot both succeed.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// Loads the items with the given IDs in one call.
    ///
    /// Unknown IDs are skipped, not reported; callers detect them by
    /// comparing the result against what they asked for.
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<StockItem>>;

    /// Writes all items atomically: either every item is stored or none is.
    ///
    /// Fails with `ConcurrencyConflict` if any item's stored version differs
    /// from the version it was loaded at.
    async fn save_all(&self, items: &[StockItem]) -> Result<()>;

    /// Stores a newly provisioned item.
    async fn insert(&self, item: &StockItem) -> Result<()>;

    /// Loads a single item.
    async fn get(&self, id: &ProductId) -> Result<Option<StockItem>> {
        let mut items = self.fetch_by_ids(std::slice::from_ref(id)).await?;
        Ok(items.pop())
    }
}

#[async_trait]
impl<T: StockRepository + ?Sized> StockRepository for Arc<T> {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<StockItem>> {
        (**self).fetch_by_ids(ids).await
    }

    async fn save_all(&self, items: &[StockItem]) -> Result<()> {
        (**self).save_all(items).await
    }

    async fn insert(&self, item: &StockItem) -> Result<()> {
        (**self).insert(item).await
    }

    async fn get(&self, id: &ProductId) -> Result<Option<StockItem>> {
        (**self).get(id).await
    }
}

/// Rejects batches naming the same product twice.
///
/// A batch with duplicates would race with itself on the version check.
pub(crate) fn validate_batch(items: &[StockItem]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.product_id()) {
            return Err(StoreError::InvalidBatch(format!(
                "batch names product {} more than once",
                item.product_id()
            )));
        }
    }
    Ok(())
}
