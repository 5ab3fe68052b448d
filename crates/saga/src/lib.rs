//! Stock reservation saga.
//!
//! Triggered by `order.created`, the saga reserves stock for every line of
//! the order or for none of them:
//! 1. Fetch all named stock items in one batch
//! 2. Validate every line before anything is mutated
//! 3. Reserve the units in memory
//! 4. Persist all items in one version-checked batch
//! 5. Emit `inventory.reserved` or `inventory.reservation_failed`
//!
//! A version conflict in step 4 restarts the run from step 1.

pub mod error;
pub mod handler;
pub mod outcome;
pub mod reservation;
pub mod state;

pub use error::SagaError;
pub use handler::{OrderCreatedHandler, reservation_request};
pub use outcome::{FailureReason, OutcomeEvent, ReservationOutcome, ReservationReport};
pub use reservation::{ReservationSaga, SagaConfig};
pub use state::ReservationState;
