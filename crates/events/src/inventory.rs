//! Inventory outcome events, published by the inventory service.

use common::{AggregateId, CorrelationId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{EventHeader, EventKind, IntegrationEvent};

/// One product's share of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Published when stock for every line of an order has been reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReserved {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub reservations: Vec<StockReservation>,
}

impl InventoryReserved {
    pub fn new(
        order_id: AggregateId,
        correlation_id: CorrelationId,
        reservations: Vec<StockReservation>,
    ) -> Self {
        Self {
            header: EventHeader::new(EventKind::InventoryReserved, order_id, correlation_id),
            order_id,
            reservations,
        }
    }
}

impl IntegrationEvent for InventoryReserved {
    const KIND: EventKind = EventKind::InventoryReserved;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Compensating event: the order's stock could not be reserved and nothing
/// was reserved for any of its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReservationFailed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    /// The product that caused the failure, when a single one is to blame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    pub reason: String,
}

impl InventoryReservationFailed {
    pub fn new(
        order_id: AggregateId,
        correlation_id: CorrelationId,
        product_id: Option<ProductId>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            header: EventHeader::new(
                EventKind::InventoryReservationFailed,
                order_id,
                correlation_id,
            ),
            order_id,
            product_id,
            reason: reason.into(),
        }
    }
}

impl IntegrationEvent for InventoryReservationFailed {
    const KIND: EventKind = EventKind::InventoryReservationFailed;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}
