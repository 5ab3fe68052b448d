//! Broker connection and topology declaration.

use lapin::{
    Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongString},
};
use tracing::{debug, info};

use crate::{MessagingError, Result};

/// Where and how to reach the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "admin".to_string(),
            password: "admin".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl BrokerConfig {
    /// AMQP URI for this configuration.
    ///
    /// The vhost is percent-encoded, so the default `/` becomes `%2f`.
    pub fn url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.user,
            self.password,
            self.host,
            self.port,
            self.vhost.replace('/', "%2f")
        )
    }

    /// Same as [`url`](Self::url) with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            self.user,
            self.host,
            self.port,
            self.vhost.replace('/', "%2f")
        )
    }
}

/// An open broker connection with a channel for topology declarations.
///
/// Publishers and consumers open their own channels through
/// [`create_channel`](Self::create_channel).
pub struct BrokerConnection {
    connection: Connection,
    channel: Channel,
}

impl BrokerConnection {
    /// Connects to the broker. Failures are returned, never retried.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let connection = Connection::connect(&config.url(), ConnectionProperties::default())
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::Connection(format!("failed to open channel: {e}")))?;

        info!(url = %config.redacted_url(), "connected to broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Opens an additional channel on this connection.
    pub async fn create_channel(&self) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::Connection(format!("failed to open channel: {e}")))
    }

    /// Declares a durable topic exchange. Idempotent.
    pub async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Declare(format!("exchange {name}: {e}")))?;

        debug!(exchange = %name, "declared exchange");
        Ok(())
    }

    /// Declares a durable quorum queue and binds it to `exchange` under
    /// `routing_key`. Idempotent.
    ///
    /// Quorum queues stamp redeliveries with `x-delivery-count`, which the
    /// consumer's redelivery policy reads. An existing classic queue of the
    /// same name makes the declaration fail. With a dead-letter exchange, messages rejected without requeue are
    /// routed there instead of being dropped.
    pub async fn declare_queue(
        &self,
        name: &str,
        exchange: &str,
        routing_key: &str,
        dead_letter_exchange: Option<&str>,
    ) -> Result<()> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_arguments(dead_letter_exchange),
            )
            .await
            .map_err(|e| MessagingError::Declare(format!("queue {name}: {e}")))?;

        self.channel
            .queue_bind(
                name,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Declare(format!("binding {name} -> {exchange}: {e}")))?;

        info!(queue = %name, exchange = %exchange, routing_key = %routing_key, "bound queue");
        Ok(())
    }

    /// Returns true while the connection is usable.
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Closes the channel and the connection.
    ///
    /// Safe to call more than once, and after the broker already dropped
    /// the connection.
    pub async fn close(&self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel
                .close(200, "shutting down")
                .await
                .map_err(|e| MessagingError::Connection(e.to_string()))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(200, "shutting down")
                .await
                .map_err(|e| MessagingError::Connection(e.to_string()))?;
        }
        info!("broker connection closed");
        Ok(())
    }
}

fn queue_arguments(dead_letter_exchange: Option<&str>) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-queue-type".into(),
        AMQPValue::LongString(LongString::from("quorum".to_string())),
    );
    if let Some(exchange) = dead_letter_exchange {
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(LongString::from(exchange.to_string())),
        );
    }
    arguments
}
