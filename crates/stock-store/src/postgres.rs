use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ProductId, Version};
use domain::StockItem;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::store::{StockRepository, validate_batch};
use crate::{Result, StoreError};

/// PostgreSQL-backed stock repository.
///
/// `save_all` runs in one transaction and every row update is guarded by
/// `version = <loaded version>`, which makes check-then-apply safe against
/// concurrent reservations of the same product.
#[derive(Clone)]
pub struct PostgresStockRepository {
    pool: PgPool,
}

impl PostgresStockRepository {
    /// Creates a new PostgreSQL stock repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_item(row: PgRow) -> Result<StockItem> {
        let product_id = ProductId::new(row.try_get::<String, _>("product_id")?);
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        StockItem::restore(
            product_id.clone(),
            row.try_get("total_stock")?,
            row.try_get("reserved_stock")?,
            row.try_get("is_active")?,
            updated_at,
            Version::new(row.try_get("version")?),
        )
        .map_err(|source| StoreError::Corrupt { product_id, source })
    }
}

#[async_trait]
impl StockRepository for PostgresStockRepository {
    async fn fetch_by_ids(&self, ids: &[ProductId]) -> Result<Vec<StockItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_id, total_stock, reserved_stock, is_active, version, updated_at
            FROM stock_items
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(&keys)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(requested = ids.len(), found = rows.len(), "fetched stock items");
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn save_all(&self, items: &[StockItem]) -> Result<()> {
        validate_batch(items)?;
        if items.is_empty() {
            return Ok(());
        }

        // Rolled back on drop unless committed.
        let mut tx = self.pool.begin().await?;

        for item in items {
            let updated = sqlx::query(
                r#"
                UPDATE stock_items
                SET total_stock = $2,
                    reserved_stock = $3,
                    is_active = $4,
                    updated_at = $5,
                    version = version + 1
                WHERE product_id = $1 AND version = $6
                "#,
            )
            .bind(item.product_id().as_str())
            .bind(item.total_stock())
            .bind(item.reserved_stock())
            .bind(item.is_active())
            .bind(item.updated_at())
            .bind(item.version().as_i64())
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM stock_items WHERE product_id = $1")
                        .bind(item.product_id().as_str())
                        .fetch_optional(&mut *tx)
                        .await?;

                return Err(match actual {
                    Some(actual) => StoreError::ConcurrencyConflict {
                        product_id: item.product_id().clone(),
                        expected: item.version(),
                        actual: Version::new(actual),
                    },
                    None => StoreError::NotFound(item.product_id().clone()),
                });
            }
        }

        tx.commit().await?;
        metrics::counter!("stock_batches_saved_total").increment(1);
        Ok(())
    }

    async fn insert(&self, item: &StockItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_items (product_id, total_stock, reserved_stock, is_active, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.product_id().as_str())
        .bind(item.total_stock())
        .bind(item.reserved_stock())
        .bind(item.is_active())
        .bind(Version::first().as_i64())
        .bind(item.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(item.product_id().clone());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }
}
