//! Dispatch of encoded catalog events through a recording handler.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{AggregateId, CorrelationId, UserId};
use events::{
    EventKind, InventoryReserved, OrderCreated, OrderLine, PaymentProcessed, decode,
};
use messaging::{
    Dispatcher, Disposition, EventHandler, HandlerError, InboundMessage, OutboundMessage,
    RedeliveryPolicy,
};

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<OrderCreated>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        let event: OrderCreated =
            decode(body).map_err(|e| HandlerError::Poison(e.to_string()))?;
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

fn inbound(message: OutboundMessage) -> InboundMessage {
    InboundMessage::new(message.routing_key, message.body)
}

fn setup() -> (Dispatcher, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::default());
    let mut dispatcher = Dispatcher::new(RedeliveryPolicy::default());
    dispatcher
        .subscribe(EventKind::OrderCreated, handler.clone())
        .unwrap();
    (dispatcher, handler)
}

#[tokio::test]
async fn order_created_reaches_its_handler() {
    let (dispatcher, handler) = setup();
    let event = OrderCreated::new(
        AggregateId::new(),
        UserId::new(),
        CorrelationId::from("corr-1"),
        vec![OrderLine::new("P1", 2, 9.99)],
    );

    let message = inbound(OutboundMessage::from_event(&event).unwrap());
    assert_eq!(dispatcher.dispatch(&message).await, Disposition::Ack);

    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], event);
}

#[tokio::test]
async fn other_event_types_on_the_same_queue_never_reach_the_handler() {
    let (dispatcher, handler) = setup();
    let order_id = AggregateId::new();

    let payment = PaymentProcessed::new(order_id, CorrelationId::new(), "pay-1", 20.0, "card");
    let reserved = InventoryReserved::new(order_id, CorrelationId::new(), vec![]);

    for message in [
        OutboundMessage::from_event(&payment).unwrap(),
        OutboundMessage::from_event(&reserved).unwrap(),
    ] {
        assert_eq!(dispatcher.dispatch(&inbound(message)).await, Disposition::Ack);
    }

    assert!(handler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tag_matches_but_payload_does_not_is_poison() {
    let (dispatcher, handler) = setup();

    // Right tag, missing every order field.
    let message = InboundMessage::new("order.created", br#"{"event_type":"order.created"}"#.to_vec());
    assert_eq!(dispatcher.dispatch(&message).await, Disposition::Discard);
    assert!(handler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn routing_key_is_not_trusted_over_the_body_tag() {
    let (dispatcher, handler) = setup();
    let payment = PaymentProcessed::new(AggregateId::new(), CorrelationId::new(), "p", 1.0, "card");

    let mut message = inbound(OutboundMessage::from_event(&payment).unwrap());
    message.routing_key = "order.created".to_string();

    assert_eq!(dispatcher.dispatch(&message).await, Disposition::Ack);
    assert!(handler.seen.lock().unwrap().is_empty());
}
