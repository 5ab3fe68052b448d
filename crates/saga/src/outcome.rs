//! Results of a reservation run and the events they turn into.

use common::{AggregateId, CorrelationId, ProductId};
use domain::{ReservationRequest, StockError};
use events::{InventoryReservationFailed, InventoryReserved, StockReservation};

use crate::ReservationState;

/// Why nothing was reserved.
///
/// The `Display` text is the `reason` carried by the failure event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoItems,
    FetchFailed,
    ProductNotFound(ProductId),
    CannotReserve {
        product_id: ProductId,
        error: StockError,
    },
    SaveFailed,
}

impl FailureReason {
    /// Short machine-friendly label, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::NoItems => "no_items",
            FailureReason::FetchFailed => "fetch_failed",
            FailureReason::ProductNotFound(_) => "product_not_found",
            FailureReason::CannotReserve { .. } => "cannot_reserve",
            FailureReason::SaveFailed => "save_failed",
        }
    }

    /// The product to blame, when there is a single one.
    pub fn product_id(&self) -> Option<&ProductId> {
        match self {
            FailureReason::ProductNotFound(product_id)
            | FailureReason::CannotReserve { product_id, .. } => Some(product_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoItems => write!(f, "order has no items"),
            FailureReason::FetchFailed => write!(f, "failed to fetch products"),
            FailureReason::ProductNotFound(id) => write!(f, "product {id} not found"),
            FailureReason::CannotReserve { product_id, error } => {
                write!(f, "cannot reserve product {product_id}: {error}")
            }
            FailureReason::SaveFailed => write!(f, "failed to save reserved stock to database"),
        }
    }
}

/// How a reservation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Every line was reserved, as requested.
    Reserved(Vec<StockReservation>),
    Failed(FailureReason),
}

impl ReservationOutcome {
    /// Success outcome echoing the order's lines.
    pub fn reserved(request: &ReservationRequest) -> Self {
        ReservationOutcome::Reserved(
            request
                .lines
                .iter()
                .map(|line| StockReservation {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                })
                .collect(),
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReservationOutcome::Reserved(_))
    }

    /// Terminal state matching this outcome.
    pub fn state(&self) -> ReservationState {
        match self {
            ReservationOutcome::Reserved(_) => ReservationState::Succeeded,
            ReservationOutcome::Failed(_) => ReservationState::Failed,
        }
    }

    /// The event announcing this outcome.
    pub fn to_event(&self, order_id: AggregateId, correlation_id: CorrelationId) -> OutcomeEvent {
        match self {
            ReservationOutcome::Reserved(reservations) => OutcomeEvent::Reserved(
                InventoryReserved::new(order_id, correlation_id, reservations.clone()),
            ),
            ReservationOutcome::Failed(reason) => {
                OutcomeEvent::Failed(InventoryReservationFailed::new(
                    order_id,
                    correlation_id,
                    reason.product_id().cloned(),
                    reason.to_string(),
                ))
            }
        }
    }
}

/// One of the two events a reservation run can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeEvent {
    Reserved(InventoryReserved),
    Failed(InventoryReservationFailed),
}

/// Summary of one reservation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationReport {
    pub order_id: AggregateId,
    pub correlation_id: CorrelationId,
    pub outcome: ReservationOutcome,
    /// Fetch-validate-persist passes made, conflicts included.
    pub attempts: u32,
    /// Whether the outcome event was confirmed by the broker.
    pub published: bool,
}

impl ReservationReport {
    pub fn state(&self) -> ReservationState {
        self.outcome.state()
    }
}
