//! Connection pool implementation
//!
//! Registry of live subscription connections, plus the two background
//! sweeps (heartbeat and statistics) that run for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

use crate::message;
use crate::stats::PoolStats;
use crate::subscription::SubscriptionConnection;

use super::config::PoolConfig;

/// Registry of active connections keyed by connection identifier
///
/// Sweeps copy the entries out under a short read lock and work on the
/// snapshot, so connect/disconnect never wait for a full pass.
pub struct ConnectionPool {
    /// Map of connection id to connection
    connections: RwLock<HashMap<String, Arc<SubscriptionConnection>>>,

    /// Configuration
    config: PoolConfig,
}

impl ConnectionPool {
    /// Create a new pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a new pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register a connection under `id`.
    ///
    /// An existing entry is replaced; that should not happen with unique
    /// handshake keys and is logged.
    pub async fn register(&self, id: &str, connection: Arc<SubscriptionConnection>) {
        let mut connections = self.connections.write().await;

        if connections.insert(id.to_string(), connection).is_some() {
            tracing::warn!(conn_id = %id, "Duplicate connection id, replacing entry");
        } else {
            tracing::debug!(conn_id = %id, total = connections.len(), "Connection registered");
        }
    }

    /// Remove a connection. Returns whether it was registered.
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();

        if removed {
            tracing::debug!(conn_id = %id, "Connection unregistered");
        }
        removed
    }

    /// Remove `id` only while it still maps to `connection`.
    ///
    /// A later registration under the same id is left in place.
    pub async fn unregister_if(&self, id: &str, connection: &Arc<SubscriptionConnection>) -> bool {
        let mut connections = self.connections.write().await;

        let owned = match connections.get(id) {
            Some(current) => Arc::ptr_eq(current, connection),
            None => return false,
        };

        if owned {
            connections.remove(id);
            tracing::debug!(conn_id = %id, "Connection unregistered");
        } else {
            tracing::warn!(conn_id = %id, "Connection id now owned by another client, keeping entry");
        }
        owned
    }

    /// Look up a connection
    pub async fn get(&self, id: &str) -> Option<Arc<SubscriptionConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Check whether a connection is registered
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connection is registered
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<Arc<SubscriptionConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Push one ping to every registered connection.
    ///
    /// Returns the number of connections visited.
    pub async fn heartbeat(&self) -> usize {
        let connections = self.snapshot().await;

        for connection in &connections {
            connection.deliver(message::heartbeat(connection.id()));
        }

        connections.len()
    }

    /// Aggregate counts over the registry
    pub async fn stats(&self) -> PoolStats {
        let connections = self.snapshot().await;

        PoolStats {
            connections: connections.len(),
            consuming: connections.iter().filter(|c| c.is_ready()).count(),
        }
    }

    /// Spawn the heartbeat task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_heartbeat_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = pool.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pinged = pool.heartbeat().await;
                tracing::trace!(pinged, "Heartbeat sent");
            }
        })
    }

    /// Spawn the statistics task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_stats_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = pool.config.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let stats = pool.stats().await;
                tracing::info!(
                    connections = stats.connections,
                    consuming = stats.consuming,
                    idle = stats.idle(),
                    "WebSocket pool information"
                );
            }
        })
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
