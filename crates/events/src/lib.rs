//! Integration events exchanged between services over the broker.
//!
//! Every event is a flat JSON object: the shared [`EventHeader`] fields
//! (`event_id`, `event_type`, `aggregate_id`, `occurred_at`,
//! `correlation_id`) followed by the event-specific fields. The
//! `event_type` value doubles as the routing key on the topic exchange.
//!
//! Decoding is two-stage: [`peek_event_type`] reads only the tag, then the
//! concrete payload is decoded with [`decode`].

pub mod codec;
pub mod error;
pub mod header;
pub mod inventory;
pub mod kind;
pub mod order;
pub mod payment;

pub use codec::{IntegrationEvent, decode, peek_event_type};
pub use error::EventError;
pub use header::{EventHeader, EventId};
pub use inventory::{InventoryReservationFailed, InventoryReserved, StockReservation};
pub use kind::EventKind;
pub use order::{OrderCompleted, OrderCreated, OrderFailed, OrderLine};
pub use payment::{PaymentFailed, PaymentProcessed};

/// Name of the topic exchange shared by all services.
pub const DEFAULT_EXCHANGE: &str = "ecommerce-events";
