//! The stock reservation saga.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::ProductId;
use domain::{ReservationRequest, StockError, StockItem};
use messaging::{EventPublisher, EventPublisherExt};
use stock_store::{StockRepository, StoreError};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SagaError};
use crate::outcome::{FailureReason, OutcomeEvent, ReservationOutcome, ReservationReport};
use crate::state::ReservationState;

/// Tuning knobs of the reservation saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// Deadline for loading the stock items.
    pub fetch_timeout: Duration,
    /// Fetch-validate-persist passes allowed when saves hit version conflicts.
    pub max_attempts: u32,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

enum AttemptError {
    Fetch(SagaError),
    Rejected(FailureReason),
    Save(StoreError),
}

/// Reserves stock for every line of an order, or for none.
///
/// Each run ends in `Succeeded` or `Failed` and publishes exactly one
/// outcome event carrying the request's correlation id. Stock is only
/// mutated after every line has been validated, and the mutated items are
/// written in one version-checked batch, so concurrent runs cannot oversell.
pub struct ReservationSaga<R, P> {
    repository: R,
    publisher: P,
    config: SagaConfig,
}

impl<R, P> ReservationSaga<R, P>
where
    R: StockRepository,
    P: EventPublisher,
{
    pub fn new(repository: R, publisher: P) -> Self {
        Self::with_config(repository, publisher, SagaConfig::default())
    }

    pub fn with_config(repository: R, publisher: P, config: SagaConfig) -> Self {
        Self {
            repository,
            publisher,
            config: SagaConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Runs the saga for one request.
    ///
    /// Business failures end in `Ok` with a failed outcome. `Err` means the
    /// stock could not be loaded: the failure event has still been emitted,
    /// and the caller should retry the whole request later.
    #[tracing::instrument(
        name = "saga.reserve",
        skip_all,
        fields(
            order_id = %request.order_id,
            correlation_id = %request.correlation_id,
            lines = request.lines.len()
        )
    )]
    pub async fn execute(&self, request: &ReservationRequest) -> Result<ReservationReport> {
        metrics::counter!("reservations_total").increment(1);
        let started = Instant::now();
        let mut state = ReservationState::NotStarted;
        let mut attempts = 0;

        let outcome = if request.is_empty() {
            ReservationOutcome::Failed(FailureReason::NoItems)
        } else {
            loop {
                attempts += 1;
                match self.attempt(request, &mut state).await {
                    Ok(()) => break ReservationOutcome::reserved(request),
                    Err(AttemptError::Rejected(reason)) => {
                        break ReservationOutcome::Failed(reason);
                    }
                    Err(AttemptError::Fetch(err)) => {
                        warn!(error = %err, "failed to fetch stock items");
                        transition(&mut state, ReservationState::Failed);
                        let outcome = ReservationOutcome::Failed(FailureReason::FetchFailed);
                        self.finish(request, outcome, attempts, started).await;
                        return Err(err);
                    }
                    Err(AttemptError::Save(err))
                        if err.is_conflict() && attempts < self.config.max_attempts =>
                    {
                        warn!(error = %err, attempt = attempts, "stock changed concurrently, retrying");
                        metrics::counter!("reservation_conflicts_total").increment(1);
                    }
                    Err(AttemptError::Save(err)) => {
                        error!(error = %err, attempt = attempts, "failed to save reserved stock");
                        break ReservationOutcome::Failed(FailureReason::SaveFailed);
                    }
                }
            }
        };

        transition(&mut state, outcome.state());
        Ok(self.finish(request, outcome, attempts, started).await)
    }

    /// One fetch-validate-apply-persist pass.
    async fn attempt(
        &self,
        request: &ReservationRequest,
        state: &mut ReservationState,
    ) -> std::result::Result<(), AttemptError> {
        transition(state, ReservationState::Fetching);
        let ids = request.product_ids();
        let items = tokio::time::timeout(
            self.config.fetch_timeout,
            self.repository.fetch_by_ids(&ids),
        )
        .await
        .map_err(|_| AttemptError::Fetch(SagaError::FetchTimeout(self.config.fetch_timeout)))?
        .map_err(|e| AttemptError::Fetch(SagaError::Fetch(e)))?;

        let mut loaded: HashMap<ProductId, StockItem> = items
            .into_iter()
            .map(|item| (item.product_id().clone(), item))
            .collect();

        transition(state, ReservationState::Validating);
        // A non-positive line must not hide inside a positive per-product sum.
        if let Some(line) = request.lines.iter().find(|line| line.quantity <= 0) {
            return Err(AttemptError::Rejected(FailureReason::CannotReserve {
                product_id: line.product_id.clone(),
                error: StockError::InvalidQuantity {
                    quantity: line.quantity,
                },
            }));
        }

        // Quantities are summed per product so a product named on two lines
        // is checked against its total demand.
        let wanted = request.quantities_by_product();
        for (product_id, quantity) in &wanted {
            let item = loaded
                .get(product_id)
                .ok_or_else(|| AttemptError::Rejected(FailureReason::ProductNotFound(product_id.clone())))?;
            item.can_reserve(*quantity).map_err(|error| {
                AttemptError::Rejected(FailureReason::CannotReserve {
                    product_id: product_id.clone(),
                    error,
                })
            })?;
        }

        transition(state, ReservationState::Applying);
        let mut mutated = Vec::with_capacity(wanted.len());
        for (product_id, quantity) in wanted {
            let Some(mut item) = loaded.remove(&product_id) else {
                return Err(AttemptError::Rejected(FailureReason::ProductNotFound(product_id)));
            };
            if let Err(error) = item.reserve(quantity) {
                return Err(AttemptError::Rejected(FailureReason::CannotReserve {
                    product_id,
                    error,
                }));
            }
            mutated.push(item);
        }

        transition(state, ReservationState::Persisting);
        self.repository
            .save_all(&mutated)
            .await
            .map_err(AttemptError::Save)
    }

    /// Publishes the outcome event and records the run.
    async fn finish(
        &self,
        request: &ReservationRequest,
        outcome: ReservationOutcome,
        attempts: u32,
        started: Instant,
    ) -> ReservationReport {
        let event = outcome.to_event(request.order_id, request.correlation_id.clone());
        let published = match &event {
            OutcomeEvent::Reserved(e) => self.publisher.publish_event(e).await,
            OutcomeEvent::Failed(e) => self.publisher.publish_event(e).await,
        };
        // Stock is already committed at this point; a lost event is only logged.
        let published = match published {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to publish reservation outcome");
                false
            }
        };

        match &outcome {
            ReservationOutcome::Reserved(reservations) => {
                metrics::counter!("reservations_succeeded").increment(1);
                info!(products = reservations.len(), attempts, "stock reserved");
            }
            ReservationOutcome::Failed(reason) => {
                metrics::counter!("reservations_failed", "reason_kind" => reason.kind())
                    .increment(1);
                info!(%reason, attempts, "reservation failed");
            }
        }
        metrics::histogram!("reservation_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        ReservationReport {
            order_id: request.order_id,
            correlation_id: request.correlation_id.clone(),
            outcome,
            attempts,
            published,
        }
    }
}

fn transition(state: &mut ReservationState, next: ReservationState) {
    debug_assert!(state.can_transition_to(next), "{state} -> {next}");
    debug!(from = %state, to = %next, "reservation state changed");
    *state = next;
}
