//! Broker entry point of the reservation saga.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ReservationLine, ReservationRequest};
use events::OrderCreated;
use messaging::{EventHandler, EventPublisher, HandlerError};
use stock_store::StockRepository;

use crate::ReservationSaga;

/// Runs the reservation saga for each `order.created` message.
///
/// A body that does not decode as `order.created` is poison. A saga that
/// could not load stock is retryable. Everything else, business failures
/// included, completes the message.
pub struct OrderCreatedHandler<R, P> {
    saga: Arc<ReservationSaga<R, P>>,
}

impl<R, P> OrderCreatedHandler<R, P> {
    pub fn new(saga: Arc<ReservationSaga<R, P>>) -> Self {
        Self { saga }
    }
}

/// Builds the saga input from an order event.
pub fn reservation_request(event: &OrderCreated) -> ReservationRequest {
    ReservationRequest::new(
        event.header.correlation_id.clone(),
        event.order_id,
        event
            .items
            .iter()
            .map(|item| ReservationLine::new(item.product_id.clone(), item.quantity))
            .collect(),
    )
}

#[async_trait]
impl<R, P> EventHandler for OrderCreatedHandler<R, P>
where
    R: StockRepository,
    P: EventPublisher,
{
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: OrderCreated =
            events::decode(body).map_err(|e| HandlerError::Poison(e.to_string()))?;

        tracing::debug!(
            order_id = %event.order_id,
            correlation_id = %event.header.correlation_id,
            items = event.items.len(),
            "received order"
        );

        self.saga
            .execute(&reservation_request(&event))
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::Retryable(e.to_string()))
    }
}
