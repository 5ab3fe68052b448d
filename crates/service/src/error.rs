//! Startup error types.

use messaging::MessagingError;
use stock_store::StoreError;
use thiserror::Error;

/// Errors that stop the service from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stock store error: {0}")]
    Store(#[from] StoreError),

    #[error("broker error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("consumer task panicked: {0}")]
    ConsumerPanicked(String),
}
