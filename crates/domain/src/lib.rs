//! Domain layer of the inventory service.
//!
//! This crate is pure logic with no I/O:
//! - [`StockItem`], the per-product stock ledger and its guard rules
//! - [`ReservationRequest`], the transient input of one reservation saga run

pub mod reservation;
pub mod stock;

pub use common::ProductId;
pub use reservation::{ReservationLine, ReservationRequest};
pub use stock::{StockError, StockItem};
