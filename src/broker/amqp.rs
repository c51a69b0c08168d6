//! AMQP implementation of [`BrokerChannel`] on top of `lapin`

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions,
    QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::watch;

use super::{BrokerChannel, BrokerConfig, BrokerError, ConsumerTag, DeliveryCallback, QueueOptions};

/// Shared AMQP connection with a single channel used by every client
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    failure: watch::Receiver<Option<String>>,
}

impl AmqpBroker {
    /// Connect to the broker and open the shared channel
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut uri: AMQPUri = config.url.parse().map_err(BrokerError::Connect)?;
        if uri.query.heartbeat.is_none() {
            uri.query.heartbeat = Some(config.heartbeat_secs);
        }

        let connection = Connection::connect_uri(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let (tx, failure) = watch::channel(None);
        let tx = Arc::new(tx);

        let conn_tx = Arc::clone(&tx);
        connection.on_error(move |err| {
            tracing::error!(error = %err, "Broker connection error");
            let _ = conn_tx.send(Some(err.to_string()));
        });
        channel.on_error(move |err| {
            tracing::error!(error = %err, "Broker channel error");
            let _ = tx.send(Some(err.to_string()));
        });

        tracing::info!(exchange = %config.exchange, "Connected to broker");

        Ok(Self {
            connection,
            channel,
            failure,
        })
    }

    /// Resolve once the shared connection or channel has failed.
    ///
    /// Every client depends on the one channel, so callers treat this as
    /// fatal for the whole process.
    pub async fn failed(&self) -> BrokerError {
        let mut failure = self.failure.clone();
        let reason = match failure.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            Err(_) => "failure watcher dropped".to_string(),
        };
        BrokerError::ConnectionLost(reason)
    }

    /// Close the connection
    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            tracing::debug!(error = %e, "Broker close failed");
        }
    }
}

#[async_trait]
impl BrokerChannel for AmqpBroker {
    async fn assert_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError> {
        let declare = QueueDeclareOptions {
            durable: options.durable,
            auto_delete: options.auto_delete,
            ..Default::default()
        };
        self.channel
            .queue_declare(queue, declare, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::operation("queue_declare", queue, e))
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::operation("queue_bind", queue, e))
    }

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_unbind(queue, exchange, routing_key, FieldTable::default())
            .await
            .map_err(|e| BrokerError::operation("queue_unbind", queue, e))
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::operation("queue_delete", queue, e))
    }

    async fn consume(
        &self,
        queue: &str,
        on_delivery: DeliveryCallback,
    ) -> Result<ConsumerTag, BrokerError> {
        let options = BasicConsumeOptions {
            no_ack: true,
            ..Default::default()
        };
        let mut consumer = self
            .channel
            .basic_consume(queue, "", options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::operation("basic_consume", queue, e))?;

        let tag = ConsumerTag::new(consumer.tag().as_str());
        let queue = queue.to_string();

        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        if delivery.data.is_empty() {
                            continue;
                        }
                        on_delivery(Bytes::from(delivery.data));
                    }
                    Err(e) => {
                        tracing::warn!(queue = %queue, error = %e, "Consumer stream error");
                        break;
                    }
                }
            }
            tracing::debug!(queue = %queue, "Consumer stream ended");
        });

        Ok(tag)
    }

    async fn cancel_consume(&self, tag: &ConsumerTag) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(tag.as_str(), BasicCancelOptions::default())
            .await
            .map_err(|e| BrokerError::operation("basic_cancel", tag.as_str(), e))
    }
}
