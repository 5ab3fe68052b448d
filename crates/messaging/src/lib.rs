//! RabbitMQ plumbing for integration events.
//!
//! - [`BrokerConnection`] opens the connection and declares the topology.
//! - [`AmqpPublisher`] publishes with confirms through one sender task.
//! - [`EventConsumer`] reads a queue and routes each message by its
//!   `event_type` to the handler subscribed for it.
//!
//! [`InMemoryPublisher`] stands in for the broker in tests.

pub mod connection;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod publisher;

pub use connection::{BrokerConfig, BrokerConnection};
pub use consumer::{
    ConsumerConfig, Dispatcher, Disposition, EventConsumer, EventHandler, HandlerError,
    InboundMessage, RedeliveryPolicy,
};
pub use error::{MessagingError, Result};
pub use memory::InMemoryPublisher;
pub use publisher::{AmqpPublisher, EventPublisher, EventPublisherExt, OutboundMessage};
