//! Order lifecycle events, published by the order service.

use common::{AggregateId, CorrelationId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::{EventHeader, EventKind, IntegrationEvent};

/// A line of an order as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: f64,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(product_id: impl Into<ProductId>, quantity: i64, price: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    /// Returns price times quantity.
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// Published once an order has been persisted; starts the reservation saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub total_amount: f64,
    pub items: Vec<OrderLine>,
}

impl OrderCreated {
    /// Creates the event for a freshly created order, totalling its lines.
    pub fn new(
        order_id: AggregateId,
        user_id: UserId,
        correlation_id: CorrelationId,
        items: Vec<OrderLine>,
    ) -> Self {
        let total_amount = items.iter().map(OrderLine::subtotal).sum();
        Self {
            header: EventHeader::new(EventKind::OrderCreated, order_id, correlation_id),
            order_id,
            user_id,
            total_amount,
            items,
        }
    }
}

impl IntegrationEvent for OrderCreated {
    const KIND: EventKind = EventKind::OrderCreated;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Published when every step of the order flow succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompleted {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub user_id: UserId,
}

impl OrderCompleted {
    pub fn new(order_id: AggregateId, user_id: UserId, correlation_id: CorrelationId) -> Self {
        Self {
            header: EventHeader::new(EventKind::OrderCompleted, order_id, correlation_id),
            order_id,
            user_id,
        }
    }
}

impl IntegrationEvent for OrderCompleted {
    const KIND: EventKind = EventKind::OrderCompleted;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Published when the order flow was abandoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub reason: String,
}

impl OrderFailed {
    pub fn new(
        order_id: AggregateId,
        user_id: UserId,
        correlation_id: CorrelationId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            header: EventHeader::new(EventKind::OrderFailed, order_id, correlation_id),
            order_id,
            user_id,
            reason: reason.into(),
        }
    }
}

impl IntegrationEvent for OrderFailed {
    const KIND: EventKind = EventKind::OrderFailed;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}
