use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use events::IntegrationEvent;

use crate::{EventPublisher, MessagingError, OutboundMessage, Result};

/// Publisher that records messages instead of sending them.
///
/// Useful for tests. Can be switched to fail every publish.
#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    published: Arc<Mutex<Vec<OutboundMessage>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail while set. Failed publishes are not recorded.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Returns everything published so far, oldest first.
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock().clone()
    }

    /// Returns the routing keys published so far, oldest first.
    pub fn routing_keys(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|message| message.routing_key.clone())
            .collect()
    }

    /// Decodes every published message of type `E`.
    pub fn events<E: IntegrationEvent>(&self) -> Vec<E> {
        self.lock()
            .iter()
            .filter(|message| message.routing_key == E::KIND.routing_key())
            .filter_map(|message| events::decode::<E>(&message.body).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutboundMessage>> {
        self.published.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MessagingError::Publish("publisher set to fail".to_string()));
        }
        self.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{AggregateId, CorrelationId};
    use events::{InventoryReserved, PaymentFailed};

    use super::*;
    use crate::EventPublisherExt;

    #[tokio::test]
    async fn records_and_decodes_by_type() {
        let publisher = InMemoryPublisher::new();
        let order_id = AggregateId::new();

        publisher
            .publish_event(&InventoryReserved::new(order_id, CorrelationId::new(), vec![]))
            .await
            .unwrap();
        publisher
            .publish_event(&PaymentFailed::new(order_id, CorrelationId::new(), "declined"))
            .await
            .unwrap();

        assert_eq!(
            publisher.routing_keys(),
            vec!["inventory.reserved", "payment.failed"]
        );
        let reserved: Vec<InventoryReserved> = publisher.events();
        assert_eq!(reserved.len(), 1);
        assert_eq!(reserved[0].order_id, order_id);
    }

    #[tokio::test]
    async fn failing_publisher_records_nothing() {
        let publisher = InMemoryPublisher::new();
        publisher.set_fail(true);

        let result = publisher
            .publish_event(&PaymentFailed::new(
                AggregateId::new(),
                CorrelationId::new(),
                "declined",
            ))
            .await;

        assert!(result.is_err());
        assert!(publisher.published().is_empty());
    }
}
