//! Inventory service.
//!
//! Consumes `order.created` from RabbitMQ, runs the stock reservation saga
//! for each order and publishes the outcome. Serves `GET /health` and
//! `GET /metrics` next to the consumer.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use stock_store::{InMemoryStockRepository, PostgresStockRepository, StockRepository};
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::StartupError;
use routes::health::HealthState;

/// Creates the Axum application router.
pub fn create_app(health: HealthState, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(health)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Opens the stock repository selected by the configuration.
///
/// With `DATABASE_URL` set, connects to PostgreSQL and runs the migrations;
/// otherwise falls back to an empty in-memory store. Returns the store and
/// its name for the health check.
pub async fn open_store(
    config: &Config,
) -> Result<(Arc<dyn StockRepository>, &'static str), StartupError> {
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            let repository = PostgresStockRepository::new(pool);
            repository.run_migrations().await?;
            tracing::info!("using PostgreSQL stock repository");
            Ok((Arc::new(repository), "postgres"))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, stock is kept in memory and lost on exit");
            Ok((Arc::new(InMemoryStockRepository::new()), "memory"))
        }
    }
}

/// Turns the joined consumer task into the process result.
///
/// A consumer that stopped on its own error, or panicked, fails the process
/// so that a supervisor restarts it.
pub fn consumer_exit(
    joined: Result<messaging::Result<()>, JoinError>,
) -> Result<(), StartupError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "consumer stopped with error");
            Err(e.into())
        }
        Err(e) => {
            tracing::error!(error = %e, "consumer task panicked");
            Err(StartupError::ConsumerPanicked(e.to_string()))
        }
    }
}
