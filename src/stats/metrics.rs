//! Aggregate pool statistics

use std::fmt;

/// Point-in-time counts over the connection pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Registered connections
    pub connections: usize,
    /// Connections with an attached queue consumer
    pub consuming: usize,
}

impl PoolStats {
    /// Connections that have not started consuming yet, or are closing
    pub fn idle(&self) -> usize {
        self.connections.saturating_sub(self.consuming)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections={} consuming={}",
            self.connections, self.consuming
        )
    }
}
