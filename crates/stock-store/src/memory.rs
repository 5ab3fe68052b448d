use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{ProductId, Version};
use domain::StockItem;
use tokio::sync::RwLock;

use crate::store::{StockRepository, validate_batch};
use crate::{Result, StoreError};

/// In-memory stock repository for tests and local runs.
///
/// Provides the same all-or-nothing, version-checked semantics as the
/// PostgreSQL implementation, plus switches to inject failures.
#[derive(Clone, Default)]
pub struct InMemoryStockRepository {
    items: Arc<RwLock<HashMap<ProductId, StockItem>>>,
    fail_on_fetch: Arc<AtomicBool>,
    fail_on_save: Arc<AtomicBool>,
    pending_conflicts: Arc<AtomicU32>,
    save_count: Arc<AtomicUsize>,
}

impl InMemoryStockRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding the given items.
    pub async fn with_items(items: impl IntoIterator<Item = StockItem>) -> Result<Self> {
        let repo = Self::new();
        for item in items {
            repo.insert(&item).await?;
        }
        Ok(repo)
    }

    /// Makes every fetch fail while set.
    pub fn set_fail_on_fetch(&self, fail: bool) {
        self.fail_on_fetch.store(fail, Ordering::SeqCst);
    }

    /// Makes every save fail while set.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` saves fail as if another writer got there first.
    pub fn fail_next_saves_with_conflict(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Returns the number of committed saves.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Returns the number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn take_pending_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StockRepository for InMemoryStockRepository {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<StockItem>> {
        if self.fail_on_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fetch failed".to_string()));
        }

        let items = self.items.read().await;
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn save_all(&self, batch: &[StockItem]) -> Result<()> {
        validate_batch(batch)?;

        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save failed".to_string()));
        }

        let mut items = self.items.write().await;

        if let Some(first) = batch.first()
            && self.take_pending_conflict()
        {
            return Err(StoreError::ConcurrencyConflict {
                product_id: first.product_id().clone(),
                expected: first.version(),
                actual: first.version().next(),
            });
        }

        // Check every version before writing anything.
        for item in batch {
            let stored = items
                .get(item.product_id())
                .ok_or_else(|| StoreError::NotFound(item.product_id().clone()))?;
            if stored.version() != item.version() {
                return Err(StoreError::ConcurrencyConflict {
                    product_id: item.product_id().clone(),
                    expected: item.version(),
                    actual: stored.version(),
                });
            }
        }

        for item in batch {
            let next = item.clone().at_version(item.version().next());
            items.insert(item.product_id().clone(), next);
        }

        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, item: &StockItem) -> Result<()> {
        let mut items = self.items.write().await;
        if items.contains_key(item.product_id()) {
            return Err(StoreError::AlreadyExists(item.product_id().clone()));
        }
        items.insert(
            item.product_id().clone(),
            item.clone().at_version(Version::first()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo_with(items: &[(&str, i64)]) -> InMemoryStockRepository {
        InMemoryStockRepository::with_items(
            items
                .iter()
                .map(|(id, total)| StockItem::new(*id, *total).unwrap()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_skips_unknown_ids() {
        let repo = repo_with(&[("A", 5), ("B", 3)]).await;
        let items = repo
            .fetch_by_ids(&[ProductId::new("A"), ProductId::new("Z")])
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id().as_str(), "A");
        assert_eq!(items[0].version(), Version::first());
    }

    #[tokio::test]
    async fn save_bumps_version() {
        let repo = repo_with(&[("A", 5)]).await;
        let mut item = repo.get(&ProductId::new("A")).await.unwrap().unwrap();
        item.reserve(2).unwrap();

        repo.save_all(&[item]).await.unwrap();

        let stored = repo.get(&ProductId::new("A")).await.unwrap().unwrap();
        assert_eq!(stored.reserved_stock(), 2);
        assert_eq!(stored.version(), Version::new(2));
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn stale_item_conflicts_and_nothing_is_written() {
        let repo = repo_with(&[("A", 5), ("B", 5)]).await;
        let loaded = repo
            .fetch_by_ids(&[ProductId::new("A"), ProductId::new("B")])
            .await
            .unwrap();

        // Another writer updates B first.
        let mut concurrent = loaded[1].clone();
        concurrent.reserve(1).unwrap();
        repo.save_all(&[concurrent]).await.unwrap();

        let mut a = loaded[0].clone();
        let mut b = loaded[1].clone();
        a.reserve(2).unwrap();
        b.reserve(2).unwrap();
        let err = repo.save_all(&[a, b]).await.unwrap_err();
        assert!(err.is_conflict());

        let a = repo.get(&ProductId::new("A")).await.unwrap().unwrap();
        let b = repo.get(&ProductId::new("B")).await.unwrap().unwrap();
        assert_eq!(a.reserved_stock(), 0);
        assert_eq!(b.reserved_stock(), 1);
    }

    #[tokio::test]
    async fn injected_failures() {
        let repo = repo_with(&[("A", 5)]).await;
        let item = repo.get(&ProductId::new("A")).await.unwrap().unwrap();

        repo.set_fail_on_save(true);
        assert!(matches!(
            repo.save_all(std::slice::from_ref(&item)).await,
            Err(StoreError::Unavailable(_))
        ));
        repo.set_fail_on_save(false);

        repo.fail_next_saves_with_conflict(1);
        assert!(
            repo.save_all(std::slice::from_ref(&item))
                .await
                .unwrap_err()
                .is_conflict()
        );
        assert!(repo.save_all(&[item]).await.is_ok());

        repo.set_fail_on_fetch(true);
        assert!(repo.fetch_by_ids(&[ProductId::new("A")]).await.is_err());
    }

    #[tokio::test]
    async fn insert_twice_fails() {
        let repo = repo_with(&[("A", 5)]).await;
        let err = repo
            .insert(&StockItem::new("A", 1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }
}
