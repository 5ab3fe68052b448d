//! Stock ledger for a single product.

use chrono::{DateTime, Duration, Utc};
use common::{ProductId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Violations of the stock ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// The product does not accept new reservations.
    #[error("product is not active")]
    NotActive,

    /// Quantities must be strictly positive.
    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Not enough unreserved units.
    #[error("insufficient stock available: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("cannot confirm more than reserved: requested {requested}, reserved {reserved}")]
    ConfirmExceedsReserved { requested: i64, reserved: i64 },

    #[error("cannot release more than reserved: requested {requested}, reserved {reserved}")]
    ReleaseExceedsReserved { requested: i64, reserved: i64 },

    /// Counters loaded from storage break `0 <= reserved <= total`.
    #[error("inconsistent stock counters: total {total}, reserved {reserved}")]
    InconsistentCounters { total: i64, reserved: i64 },
}

/// Stock counters of one product.
///
/// `reserved_stock` counts units promised to in-flight orders and never
/// exceeds `total_stock`. The counters only change through [`reserve`],
/// [`confirm`] and [`release`].
///
/// [`reserve`]: StockItem::reserve
/// [`confirm`]: StockItem::confirm
/// [`release`]: StockItem::release
///
/// Deserialization goes through [`StockItem::restore`], so a decoded item
/// always satisfies `0 <= reserved <= total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StockRecord")]
pub struct StockItem {
    product_id: ProductId,
    total_stock: i64,
    reserved_stock: i64,
    active: bool,
    updated_at: DateTime<Utc>,
    /// Version the item was loaded at; checked by the store on save.
    version: Version,
}

/// Unchecked wire shape of [`StockItem`].
#[derive(Deserialize)]
struct StockRecord {
    product_id: ProductId,
    total_stock: i64,
    reserved_stock: i64,
    active: bool,
    updated_at: DateTime<Utc>,
    version: Version,
}

impl TryFrom<StockRecord> for StockItem {
    type Error = StockError;

    fn try_from(record: StockRecord) -> Result<Self, Self::Error> {
        Self::restore(
            record.product_id,
            record.total_stock,
            record.reserved_stock,
            record.active,
            record.updated_at,
            record.version,
        )
    }
}

impl StockItem {
    /// Provisions a new, active product with no reservations.
    pub fn new(product_id: impl Into<ProductId>, total_stock: i64) -> Result<Self, StockError> {
        Self::restore(
            product_id.into(),
            total_stock,
            0,
            true,
            Utc::now(),
            Version::initial(),
        )
    }

    /// Rebuilds an item from stored counters, checking the ledger invariants.
    pub fn restore(
        product_id: ProductId,
        total_stock: i64,
        reserved_stock: i64,
        active: bool,
        updated_at: DateTime<Utc>,
        version: Version,
    ) -> Result<Self, StockError> {
        if total_stock < 0 || reserved_stock < 0 || reserved_stock > total_stock {
            return Err(StockError::InconsistentCounters {
                total: total_stock,
                reserved: reserved_stock,
            });
        }

        Ok(Self {
            product_id,
            total_stock,
            reserved_stock,
            active,
            updated_at,
            version,
        })
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn total_stock(&self) -> i64 {
        self.total_stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// Units eligible for new reservations.
    pub fn available_stock(&self) -> i64 {
        self.total_stock - self.reserved_stock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Stamps the item with the version it now has in storage.
    pub fn at_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Checks whether `quantity` units could be reserved right now.
    pub fn can_reserve(&self, quantity: i64) -> Result<(), StockError> {
        if !self.active {
            return Err(StockError::NotActive);
        }
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if quantity > self.available_stock() {
            return Err(StockError::InsufficientStock {
                requested: quantity,
                available: self.available_stock(),
            });
        }
        Ok(())
    }

    /// Promises `quantity` units to an order.
    ///
    /// Not idempotent: reserving twice holds twice the units.
    pub fn reserve(&mut self, quantity: i64) -> Result<(), StockError> {
        self.can_reserve(quantity)?;
        self.reserved_stock += quantity;
        self.touch();
        Ok(())
    }

    /// Finalizes a sale: the units leave the warehouse.
    pub fn confirm(&mut self, quantity: i64) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if quantity > self.reserved_stock {
            return Err(StockError::ConfirmExceedsReserved {
                requested: quantity,
                reserved: self.reserved_stock,
            });
        }
        self.total_stock -= quantity;
        self.reserved_stock -= quantity;
        self.touch();
        Ok(())
    }

    /// Returns previously reserved units to the available pool.
    pub fn release(&mut self, quantity: i64) -> Result<(), StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity { quantity });
        }
        if quantity > self.reserved_stock {
            return Err(StockError::ReleaseExceedsReserved {
                requested: quantity,
                reserved: self.reserved_stock,
            });
        }
        self.reserved_stock -= quantity;
        self.touch();
        Ok(())
    }

    /// Opens or closes the product for new reservations.
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.touch();
        }
    }

    // Strictly increasing even when the clock has not moved since the last
    // mutation (or went backwards).
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }
}
