//! Event type tags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::EventError;

/// Tag identifying an integration event.
///
/// The wire value of each tag is also the routing key the event is published
/// under, so a queue binding on `order.created` receives exactly the events
/// tagged `order.created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.completed")]
    OrderCompleted,
    #[serde(rename = "order.failed")]
    OrderFailed,
    #[serde(rename = "inventory.reserved")]
    InventoryReserved,
    #[serde(rename = "inventory.reservation_failed")]
    InventoryReservationFailed,
    #[serde(rename = "payment.processed")]
    PaymentProcessed,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
}

impl EventKind {
    /// Every tag in the catalog.
    pub const ALL: [EventKind; 7] = [
        EventKind::OrderCreated,
        EventKind::OrderCompleted,
        EventKind::OrderFailed,
        EventKind::InventoryReserved,
        EventKind::InventoryReservationFailed,
        EventKind::PaymentProcessed,
        EventKind::PaymentFailed,
    ];

    /// Returns the wire value of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "order.created",
            EventKind::OrderCompleted => "order.completed",
            EventKind::OrderFailed => "order.failed",
            EventKind::InventoryReserved => "inventory.reserved",
            EventKind::InventoryReservationFailed => "inventory.reservation_failed",
            EventKind::PaymentProcessed => "payment.processed",
            EventKind::PaymentFailed => "payment.failed",
        }
    }

    /// Returns the routing key the event is published under.
    pub fn routing_key(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType(s.to_string()))
    }
}
