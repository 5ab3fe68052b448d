//! Event publishing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use events::IntegrationEvent;
use lapin::{
    BasicProperties, Channel,
    options::{BasicPublishOptions, ConfirmSelectOptions},
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{BrokerConnection, MessagingError, Result};

/// Default deadline for one publish, confirm included.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

const SEND_QUEUE_CAPACITY: usize = 256;

/// An encoded event ready to be put on the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub message_id: String,
    pub correlation_id: String,
}

impl OutboundMessage {
    /// Encodes an event; its tag becomes the routing key.
    pub fn from_event<E: IntegrationEvent>(event: &E) -> Result<Self> {
        let header = event.header();
        Ok(Self {
            routing_key: E::KIND.routing_key().to_string(),
            body: event.encode()?,
            message_id: header.event_id.to_string(),
            correlation_id: header.correlation_id.to_string(),
        })
    }
}

/// Puts messages on the event exchange.
///
/// A returned error means the broker did not confirm the message within
/// the deadline. Nothing is retried; the caller decides whether that
/// matters.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<()>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        (**self).publish(message).await
    }
}

/// Typed publishing on top of [`EventPublisher`].
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Encodes and publishes an event under its own routing key.
    async fn publish_event<E: IntegrationEvent>(&self, event: &E) -> Result<()> {
        self.publish(OutboundMessage::from_event(event)?).await
    }
}

impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}

struct PublishRequest {
    message: OutboundMessage,
    reply: oneshot::Sender<Result<()>>,
}

/// Publisher backed by RabbitMQ with publisher confirms.
///
/// One background task owns the channel and publishes requests in arrival
/// order; handles only hold the sending half of its queue and are cheap to
/// clone. The task ends when every handle has been dropped.
#[derive(Clone)]
pub struct AmqpPublisher {
    requests: mpsc::Sender<PublishRequest>,
    timeout: Duration,
}

impl AmqpPublisher {
    /// Opens a confirm-mode channel and spawns the sender task.
    pub async fn start(
        connection: &BrokerConnection,
        exchange: impl Into<String>,
        timeout: Duration,
    ) -> Result<(Self, JoinHandle<()>)> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| MessagingError::Connection(format!("failed to enable confirms: {e}")))?;

        let (requests, queue) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let handle = tokio::spawn(run_sender(channel, exchange.into(), queue));

        Ok((Self { requests, timeout }, handle))
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    #[tracing::instrument(
        name = "publisher.publish",
        skip_all,
        fields(routing_key = %message.routing_key, correlation_id = %message.correlation_id)
    )]
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        let routing_key = message.routing_key.clone();
        let (reply, response) = oneshot::channel();

        // The deadline covers waiting for queue space too.
        let outcome = tokio::time::timeout(self.timeout, async {
            self.requests
                .send(PublishRequest { message, reply })
                .await
                .map_err(|_| MessagingError::PublisherClosed)?;
            response.await.map_err(|_| MessagingError::PublisherClosed)?
        })
        .await
        .unwrap_or(Err(MessagingError::Timeout(self.timeout)));

        match &outcome {
            Ok(()) => {
                metrics::counter!("events_published_total", "routing_key" => routing_key)
                    .increment(1);
            }
            Err(e) => {
                warn!(error = %e, "event publish failed");
                metrics::counter!("event_publish_failures_total", "routing_key" => routing_key)
                    .increment(1);
            }
        }
        outcome
    }
}

async fn run_sender(channel: Channel, exchange: String, mut queue: mpsc::Receiver<PublishRequest>) {
    while let Some(request) = queue.recv().await {
        let result = send(&channel, &exchange, &request.message).await;
        if let Err(e) = &result {
            error!(
                error = %e,
                routing_key = %request.message.routing_key,
                "broker rejected publish"
            );
        }
        // The caller may have timed out and gone away.
        let _ = request.reply.send(result);
    }
    debug!(exchange = %exchange, "publisher queue closed, sender task exiting");
}

async fn send(channel: &Channel, exchange: &str, message: &OutboundMessage) -> Result<()> {
    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2) // persistent
        .with_timestamp(Utc::now().timestamp().max(0) as u64)
        .with_message_id(message.message_id.clone().into())
        .with_correlation_id(message.correlation_id.clone().into());

    let confirmation = channel
        .basic_publish(
            exchange,
            &message.routing_key,
            BasicPublishOptions::default(),
            &message.body,
            properties,
        )
        .await
        .map_err(|e| MessagingError::Publish(e.to_string()))?
        .await
        .map_err(|e| MessagingError::Publish(format!("confirmation failed: {e}")))?;

    if confirmation.is_nack() {
        return Err(MessagingError::Publish("broker nacked the message".to_string()));
    }

    debug!(exchange = %exchange, routing_key = %message.routing_key, "published event");
    Ok(())
}
