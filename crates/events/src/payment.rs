//! Payment events, published by the payment service.

use common::{AggregateId, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::{EventHeader, EventKind, IntegrationEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub payment_id: String,
    pub amount: f64,
    pub payment_method: String,
}

impl PaymentProcessed {
    pub fn new(
        order_id: AggregateId,
        correlation_id: CorrelationId,
        payment_id: impl Into<String>,
        amount: f64,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            header: EventHeader::new(EventKind::PaymentProcessed, order_id, correlation_id),
            order_id,
            payment_id: payment_id.into(),
            amount,
            payment_method: payment_method.into(),
        }
    }
}

impl IntegrationEvent for PaymentProcessed {
    const KIND: EventKind = EventKind::PaymentProcessed;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailed {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: AggregateId,
    pub reason: String,
}

impl PaymentFailed {
    pub fn new(
        order_id: AggregateId,
        correlation_id: CorrelationId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            header: EventHeader::new(EventKind::PaymentFailed, order_id, correlation_id),
            order_id,
            reason: reason.into(),
        }
    }
}

impl IntegrationEvent for PaymentFailed {
    const KIND: EventKind = EventKind::PaymentFailed;

    fn header(&self) -> &EventHeader {
        &self.header
    }
}
