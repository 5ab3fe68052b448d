//! Saga error types.

use std::time::Duration;

use stock_store::StoreError;
use thiserror::Error;

/// Errors that leave a reservation worth retrying.
///
/// Business failures (unknown product, not enough stock, failed save) are
/// not errors here: they end the run with a failure event and a
/// [`ReservationOutcome::Failed`](crate::ReservationOutcome::Failed).
#[derive(Debug, Error)]
pub enum SagaError {
    /// The stock items could not be loaded.
    #[error("failed to fetch products: {0}")]
    Fetch(#[source] StoreError),

    /// Loading the stock items took longer than allowed.
    #[error("fetching products timed out after {0:?}")]
    FetchTimeout(Duration),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
