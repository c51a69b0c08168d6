//! Connection pool configuration

use std::time::Duration;

use serde::Deserialize;

/// Timers driven by the connection pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// How often every client receives a ping
    #[serde(rename = "heartbeat_interval_secs", with = "crate::config::secs")]
    pub heartbeat_interval: Duration,

    /// How often aggregate pool statistics are logged
    #[serde(rename = "stats_interval_secs", with = "crate::config::secs")]
    pub stats_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            stats_interval: Duration::from_secs(100),
        }
    }
}

impl PoolConfig {
    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the statistics interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}
