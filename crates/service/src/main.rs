//! Inventory service entry point.

use std::sync::Arc;

use events::EventKind;
use inventory_service::config::Config;
use inventory_service::error::StartupError;
use inventory_service::routes::health::HealthState;
use inventory_service::{consumer_exit, create_app, open_store, telemetry};
use messaging::{AmqpPublisher, BrokerConnection, EventConsumer};
use saga::{OrderCreatedHandler, ReservationSaga};
use tokio::signal;
use tokio::sync::watch;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Resolves once shutdown has been requested.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    // An error means the sender is gone, which also means shutdown.
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    // 1. Initialize tracing and metrics
    telemetry::init_tracing(&config)?;
    let metrics_handle = telemetry::init_metrics()?;

    // 2. Open the stock store
    let (repository, store_backend) = open_store(&config).await?;

    // 3. Connect to the broker and start the publisher
    let broker = Arc::new(BrokerConnection::connect(&config.broker).await?);
    broker.declare_exchange(&config.exchange).await?;
    let (publisher, sender_task) =
        AmqpPublisher::start(&broker, config.exchange.clone(), config.publish_timeout).await?;

    // 4. Wire the saga to the order.created consumer
    let saga = Arc::new(ReservationSaga::new(repository, publisher));
    let mut consumer = EventConsumer::new(&broker, config.consumer_config()).await?;
    consumer.subscribe(
        EventKind::OrderCreated,
        Arc::new(OrderCreatedHandler::new(saga.clone())),
    )?;

    // 5. One shutdown flag for the consumer and the HTTP server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
        }
    });

    let consumer_task = tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        let stop = shutdown_requested(shutdown_rx.clone());
        async move {
            let result = consumer.run(stop).await;
            // Without a consumer the service has nothing left to do.
            shutdown_tx.send_replace(true);
            result
        }
    });

    // 6. Serve health and metrics until shutdown
    let health = HealthState {
        store: store_backend,
        broker: {
            let broker = broker.clone();
            Arc::new(move || broker.is_connected())
        },
    };
    let app = create_app(health, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, queue = %config.queue, "starting inventory service");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .await?;

    // 7. Drain: consumer first, then the publisher, then the connection
    let consumer_result = consumer_exit(consumer_task.await);
    drop(saga);
    if let Err(e) = sender_task.await {
        tracing::error!(error = %e, "publisher task panicked");
    }
    broker.close().await?;

    // A failed consumer exits non-zero once everything is drained.
    consumer_result?;
    tracing::info!("inventory service shut down gracefully");
    Ok(())
}
