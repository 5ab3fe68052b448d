//! Queue consumer and event-type dispatch.
//!
//! Every delivery ends in exactly one [`Disposition`]:
//!
//! | outcome                              | disposition |
//! |--------------------------------------|-------------|
//! | body has no readable `event_type`    | `Discard`   |
//! | unknown or unsubscribed event type   | `Ack`       |
//! | handler succeeded                    | `Ack`       |
//! | handler failed, retryable            | `Requeue`   |
//! | retryable, delivery limit reached    | `Discard`   |
//! | handler failed, poison message       | `Discard`   |

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use events::EventKind;
use futures_util::StreamExt;
use lapin::{
    Channel,
    message::Delivery,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicQosOptions, BasicRejectOptions,
    },
    types::{AMQPValue, FieldTable},
};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, warn};

use crate::{BrokerConnection, MessagingError, Result};

/// How a handler failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Worth another attempt: the message is requeued.
    #[error("retryable failure: {0}")]
    Retryable(String),

    /// The message can never be processed: it is discarded.
    #[error("poison message: {0}")]
    Poison(String),
}

/// Processes the raw body of messages of one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> std::result::Result<(), HandlerError>;
}

/// What the consumer tells the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Reject with requeue.
    Requeue,
    /// Reject without requeue; dead-lettered when the queue has a DLX.
    Discard,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Requeue => "requeue",
            Disposition::Discard => "discard",
        }
    }
}

/// Bounds how often a retryable failure is requeued.
///
/// Relies on the broker's `x-delivery-count` header (quorum queues). When
/// the header is absent, requeueing is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    max_deliveries: Option<u32>,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RedeliveryPolicy {
    /// Allows at most `max_deliveries` attempts per message; `0` disables
    /// the limit.
    pub fn new(max_deliveries: u32) -> Self {
        Self {
            max_deliveries: (max_deliveries > 0).then_some(max_deliveries),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            max_deliveries: None,
        }
    }

    pub fn max_deliveries(&self) -> Option<u32> {
        self.max_deliveries
    }

    /// Whether a message that has already been delivered `delivery_count`
    /// times before this attempt may be requeued once more.
    pub fn allows_requeue(&self, delivery_count: Option<u32>) -> bool {
        match (self.max_deliveries, delivery_count) {
            (Some(max), Some(count)) => count.saturating_add(1) < max,
            _ => true,
        }
    }
}

/// A delivery as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Prior deliveries reported by the broker, if it reports them.
    pub delivery_count: Option<u32>,
}

impl InboundMessage {
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body: body.into(),
            delivery_count: None,
        }
    }

    pub fn with_delivery_count(mut self, count: u32) -> Self {
        self.delivery_count = Some(count);
        self
    }
}

/// Routes messages to the handler subscribed for their event type.
pub struct Dispatcher {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    policy: RedeliveryPolicy,
}

impl Dispatcher {
    pub fn new(policy: RedeliveryPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            policy,
        }
    }

    /// Registers the handler for one event type. Only one handler per type.
    pub fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<()> {
        if self.handlers.contains_key(&kind) {
            return Err(MessagingError::AlreadySubscribed(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Runs the matching handler, if any, and decides the disposition.
    pub async fn dispatch(&self, message: &InboundMessage) -> Disposition {
        let disposition = self.route(message).await;
        metrics::counter!("messages_consumed_total", "disposition" => disposition.as_str())
            .increment(1);
        disposition
    }

    async fn route(&self, message: &InboundMessage) -> Disposition {
        let tag = match events::peek_event_type(&message.body) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, routing_key = %message.routing_key, "discarding malformed message");
                return Disposition::Discard;
            }
        };

        let Ok(kind) = tag.parse::<EventKind>() else {
            debug!(event_type = %tag, "dropping message of unknown event type");
            return Disposition::Ack;
        };

        let Some(handler) = self.handlers.get(&kind) else {
            debug!(event_type = %kind, "no handler subscribed, dropping message");
            return Disposition::Ack;
        };

        match handler.handle(&message.body).await {
            Ok(()) => Disposition::Ack,
            Err(HandlerError::Retryable(reason)) => {
                if self.policy.allows_requeue(message.delivery_count) {
                    warn!(event_type = %kind, %reason, "handler failed, requeueing");
                    Disposition::Requeue
                } else {
                    error!(
                        event_type = %kind,
                        %reason,
                        delivery_count = ?message.delivery_count,
                        "delivery limit reached, discarding"
                    );
                    Disposition::Discard
                }
            }
            Err(HandlerError::Poison(reason)) => {
                error!(event_type = %kind, %reason, "discarding poison message");
                Disposition::Discard
            }
        }
    }
}

/// Queue and binding a consumer reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub dead_letter_exchange: Option<String>,
    pub consumer_tag: String,
    /// Unacknowledged deliveries the broker may push at once.
    pub prefetch: u16,
    pub redelivery: RedeliveryPolicy,
}

impl ConsumerConfig {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        let queue = queue.into();
        Self {
            exchange: exchange.into(),
            consumer_tag: format!("{queue}-consumer"),
            queue,
            routing_key: routing_key.into(),
            dead_letter_exchange: None,
            prefetch: 1,
            redelivery: RedeliveryPolicy::default(),
        }
    }
}

/// Consumes one queue and dispatches each delivery by event type.
///
/// Deliveries are handled one at a time in the order the broker sends
/// them.
pub struct EventConsumer {
    channel: Channel,
    config: ConsumerConfig,
    dispatcher: Dispatcher,
}

impl EventConsumer {
    /// Declares the exchange, queue and binding, and opens a channel.
    pub async fn new(connection: &BrokerConnection, config: ConsumerConfig) -> Result<Self> {
        connection.declare_exchange(&config.exchange).await?;
        connection
            .declare_queue(
                &config.queue,
                &config.exchange,
                &config.routing_key,
                config.dead_letter_exchange.as_deref(),
            )
            .await?;

        let channel = connection.create_channel().await?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::Subscribe(format!("failed to set prefetch: {e}")))?;

        Ok(Self {
            channel,
            dispatcher: Dispatcher::new(config.redelivery),
            config,
        })
    }

    /// Registers the handler for one event type. Only one handler per type.
    pub fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Result<()> {
        self.dispatcher.subscribe(kind, handler)?;
        info!(queue = %self.config.queue, event_type = %kind, "subscribed handler");
        Ok(())
    }

    /// Consumes until `shutdown` resolves or the broker ends the stream.
    ///
    /// A delivery already being handled when `shutdown` fires is finished
    /// and settled first.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> Result<()> {
        let mut deliveries = self
            .channel
            .basic_consume(
                &self.config.queue,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Subscribe(format!("failed to start consumer: {e}")))?;

        info!(queue = %self.config.queue, "consuming");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(queue = %self.config.queue, "shutdown requested, stopping consumer");
                    break;
                }
                delivery = deliveries.next() => match delivery {
                    Some(Ok(delivery)) => self.process(delivery).await,
                    Some(Err(e)) => {
                        return Err(MessagingError::Consume(e.to_string()));
                    }
                    None => {
                        warn!(queue = %self.config.queue, "delivery stream ended");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self
            .channel
            .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(error = %e, "failed to cancel consumer");
        }
        Ok(())
    }

    async fn process(&self, delivery: Delivery) {
        let message = InboundMessage {
            routing_key: delivery.routing_key.as_str().to_string(),
            delivery_count: delivery_count(delivery.properties.headers().as_ref()),
            body: delivery.data.clone(),
        };
        let span = tracing::info_span!("consumer.delivery", routing_key = %message.routing_key);

        let disposition = self.dispatcher.dispatch(&message).instrument(span).await;

        let settled = match disposition {
            Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
            Disposition::Requeue => {
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
            Disposition::Discard => {
                delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
            }
        };
        if let Err(e) = settled {
            error!(error = %e, disposition = disposition.as_str(), "failed to settle delivery");
        }
    }
}

/// Reads the broker's `x-delivery-count` header.
fn delivery_count(headers: Option<&FieldTable>) -> Option<u32> {
    let (_, value) = headers?
        .inner()
        .iter()
        .find(|(key, _)| key.as_str() == "x-delivery-count")?;

    match value {
        AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        _ => None,
    }
}
