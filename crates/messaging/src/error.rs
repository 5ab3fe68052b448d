use std::time::Duration;

use events::{EventError, EventKind};
use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors raised while talking to the broker.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("declare failed: {0}")]
    Declare(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// The sender task is gone; nothing can be published any more.
    #[error("publisher is closed")]
    PublisherClosed,

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("a handler is already subscribed to {0}")]
    AlreadySubscribed(EventKind),

    #[error("event encoding failed: {0}")]
    Event(#[from] EventError),
}
