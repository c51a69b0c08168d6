//! Bridge coordinator
//!
//! Maps transport events onto subscription operations and pool
//! membership. The transport owns the socket; the coordinator never touches
//! it except through the [`ClientSink`] handed over on connect.

use std::sync::Arc;

use crate::broker::{BrokerChannel, BrokerConfig};
use crate::message::{InboundMessage, MessageKind};
use crate::pool::ConnectionPool;
use crate::routing::routing_key;
use crate::subscription::{ClientSink, SubscriptionConnection};

/// Glue between the transport, the subscription connections and the pool
pub struct Bridge {
    pool: Arc<ConnectionPool>,
    broker: Arc<dyn BrokerChannel>,
    config: BrokerConfig,
}

impl Bridge {
    /// Create a coordinator over a shared broker channel
    pub fn new(
        pool: Arc<ConnectionPool>,
        broker: Arc<dyn BrokerChannel>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            pool,
            broker,
            config,
        }
    }

    /// The connection pool
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// A client connected: create its subscription state and register it
    pub async fn on_connect(
        &self,
        id: &str,
        sink: Arc<dyn ClientSink>,
    ) -> Arc<SubscriptionConnection> {
        let connection = Arc::new(SubscriptionConnection::new(
            id,
            sink,
            Arc::clone(&self.broker),
            &self.config,
        ));

        tracing::info!(conn_id = %id, "New client is connected");
        self.pool.register(id, Arc::clone(&connection)).await;
        connection
    }

    /// A client sent a frame.
    ///
    /// Unparseable frames are dropped. Any parseable frame starts consumption
    /// if it has not started yet; only `subscribe` and `unsubscribe` change
    /// bindings.
    pub async fn on_message(&self, connection: &SubscriptionConnection, raw: &[u8]) {
        let Some(message) = InboundMessage::parse(raw) else {
            return;
        };

        if !connection.is_ready() {
            connection.start_consume().await;
        }

        let key = routing_key(&message);
        match message.kind {
            MessageKind::Subscribe => connection.add_binding(&key).await,
            MessageKind::Unsubscribe => connection.delete_binding(&key).await,
            MessageKind::Other => {
                tracing::trace!(conn_id = %connection.id(), "Ignoring message type");
            }
        }
    }

    /// A client disconnected or its socket failed
    pub async fn on_close(
        &self,
        connection: &Arc<SubscriptionConnection>,
        error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) {
        if let Some(e) = error {
            tracing::error!(conn_id = %connection.id(), error = %e, "Socket error");
        }

        connection.close();
        self.pool.unregister_if(connection.id(), connection).await;
        tracing::info!(conn_id = %connection.id(), "Client disconnected");
    }
}
