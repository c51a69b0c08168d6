//! Per-client subscription connection
//!
//! Owns one broker queue named after the connection identifier and the set
//! of routing keys that queue is bound under. Binding changes for a single
//! connection are serialized by an async mutex held across the broker call;
//! different connections proceed in parallel on the shared channel.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::broker::{BrokerChannel, BrokerConfig, ConsumerTag, DeliveryCallback, QueueOptions};
use crate::message::{content_hash, trace_text};

use super::sink::ClientSink;
use super::state::{Lifecycle, SubscriptionState};

/// Broker-side state guarded by the per-connection mutex
#[derive(Debug, Default)]
struct BrokerState {
    /// Routing keys the queue is currently bound under
    bindings: HashSet<String>,
    /// Active consumer, set once consumption started
    consumer: Option<ConsumerTag>,
    /// The queue was declared on the broker
    declared: bool,
}

/// Writes deliveries back to the client socket
#[derive(Clone)]
struct Outbound {
    id: Arc<str>,
    sink: Arc<dyn ClientSink>,
}

impl Outbound {
    fn deliver(&self, payload: Bytes) {
        if !self.sink.is_writable() {
            return;
        }

        let traced = tracing::enabled!(tracing::Level::DEBUG).then(|| payload.clone());

        if let Err(e) = self.sink.send(payload) {
            tracing::error!(conn_id = %self.id, error = %e, "Error sending message");
            return;
        }

        if let Some(text) = traced.as_deref().and_then(trace_text) {
            tracing::debug!(
                conn_id = %self.id,
                hash = %content_hash(&text),
                "Delivered message hash"
            );
        }
    }
}

/// Subscription state for a single client connection
pub struct SubscriptionConnection {
    id: Arc<str>,
    lifecycle: Lifecycle,
    state: Arc<Mutex<BrokerState>>,
    broker: Arc<dyn BrokerChannel>,
    exchange: Arc<str>,
    queue_options: QueueOptions,
    outbound: Outbound,
}

impl SubscriptionConnection {
    /// Create a connection in the `New` state
    pub fn new(
        id: impl Into<Arc<str>>,
        sink: Arc<dyn ClientSink>,
        broker: Arc<dyn BrokerChannel>,
        config: &BrokerConfig,
    ) -> Self {
        let id = id.into();
        Self {
            outbound: Outbound {
                id: Arc::clone(&id),
                sink,
            },
            id,
            lifecycle: Lifecycle::new(),
            state: Arc::new(Mutex::new(BrokerState::default())),
            broker,
            exchange: config.exchange.as_str().into(),
            queue_options: config.queue_options(),
        }
    }

    /// Connection identifier, also the queue name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SubscriptionState {
        self.lifecycle.state()
    }

    /// Whether the queue consumer is attached and the connection is open
    pub fn is_ready(&self) -> bool {
        self.lifecycle.admits_mutation()
    }

    /// Whether teardown has started
    pub fn is_closing(&self) -> bool {
        self.lifecycle.state() == SubscriptionState::Closed
    }

    /// Snapshot of the bound routing keys
    pub async fn bindings(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state.bindings.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Assert the connection queue and attach a consumer.
    ///
    /// No-op once consuming or closed. Failures are logged and leave the
    /// connection in `New`, so the next client message retries.
    pub async fn start_consume(&self) {
        if !self.lifecycle.can_start() {
            return;
        }

        let mut state = self.state.lock().await;
        if !self.lifecycle.can_start() {
            return;
        }

        if !state.declared {
            if let Err(e) = self
                .broker
                .assert_queue(&self.id, self.queue_options)
                .await
            {
                tracing::error!(conn_id = %self.id, error = %e, "Queue asserting error");
                return;
            }
            state.declared = true;
        }

        let outbound = self.outbound.clone();
        let on_delivery: DeliveryCallback = Arc::new(move |payload| outbound.deliver(payload));

        match self.broker.consume(&self.id, on_delivery).await {
            Ok(tag) => {
                state.consumer = Some(tag);
                // A concurrent close() leaves the consumer for teardown
                if self.lifecycle.mark_consuming() {
                    tracing::info!(conn_id = %self.id, "Client is consuming");
                }
            }
            Err(e) => {
                tracing::error!(conn_id = %self.id, error = %e, "Queue consuming error");
            }
        }
    }

    /// Bind the connection queue under `routing_key`.
    ///
    /// No-op unless consuming, or if the key is already bound.
    pub async fn add_binding(&self, routing_key: &str) {
        if !self.lifecycle.admits_mutation() {
            return;
        }

        let mut state = self.state.lock().await;
        if !self.lifecycle.admits_mutation() || state.bindings.contains(routing_key) {
            return;
        }

        match self
            .broker
            .bind_queue(&self.id, &self.exchange, routing_key)
            .await
        {
            Ok(()) => {
                state.bindings.insert(routing_key.to_string());
                tracing::debug!(conn_id = %self.id, routing_key, "Binding by routing key");
            }
            Err(e) => {
                tracing::error!(conn_id = %self.id, routing_key, error = %e, "Binding queue error");
            }
        }
    }

    /// Remove the binding for `routing_key`.
    ///
    /// No-op unless consuming, or if the key is not bound.
    pub async fn delete_binding(&self, routing_key: &str) {
        if !self.lifecycle.admits_mutation() {
            return;
        }

        let mut state = self.state.lock().await;
        if !self.lifecycle.admits_mutation() || !state.bindings.contains(routing_key) {
            return;
        }

        match self
            .broker
            .unbind_queue(&self.id, &self.exchange, routing_key)
            .await
        {
            Ok(()) => {
                state.bindings.remove(routing_key);
                tracing::debug!(conn_id = %self.id, routing_key, "Unbinding by routing key");
            }
            Err(e) => {
                tracing::error!(conn_id = %self.id, routing_key, error = %e, "Unbinding queue error");
            }
        }
    }

    /// Push a payload to the client, dropping it if the socket is not writable
    pub fn deliver(&self, payload: Bytes) {
        self.outbound.deliver(payload);
    }

    /// Start teardown.
    ///
    /// Marks the connection closed immediately and spawns the broker cleanup
    /// in the background. Calling it again does nothing.
    pub fn close(&self) {
        if !self.lifecycle.close() {
            return;
        }

        let id = Arc::clone(&self.id);
        let exchange = Arc::clone(&self.exchange);
        let state = Arc::clone(&self.state);
        let broker = Arc::clone(&self.broker);

        tokio::spawn(async move {
            // Waits for any binding change already in flight
            let mut state = state.lock().await;
            teardown(&id, &exchange, &mut state, broker.as_ref()).await;
        });
    }
}

/// Unbind everything, cancel the consumer, delete the queue.
///
/// Each step runs regardless of earlier failures.
async fn teardown(id: &str, exchange: &str, state: &mut BrokerState, broker: &dyn BrokerChannel) {
    let keys: Vec<String> = state.bindings.drain().collect();
    if !keys.is_empty() {
        let results = join_all(
            keys.iter()
                .map(|key| broker.unbind_queue(id, exchange, key)),
        )
        .await;

        let mut failed = 0;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                tracing::error!(conn_id = %id, routing_key = %key, error = %e, "Clear bindings error");
            }
        }
        tracing::info!(conn_id = %id, cleared = keys.len() - failed, failed, "Bindings have been cleared");
    }

    if let Some(tag) = state.consumer.take() {
        if let Err(e) = broker.cancel_consume(&tag).await {
            tracing::error!(conn_id = %id, consumer = %tag, error = %e, "Cancel consumer error");
        }
    }

    if state.declared {
        match broker.delete_queue(id).await {
            Ok(()) => tracing::info!(conn_id = %id, "Queue has been deleted"),
            Err(e) => tracing::error!(conn_id = %id, error = %e, "Delete queue error"),
        }
        state.declared = false;
    }
}

impl std::fmt::Debug for SubscriptionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionConnection")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
