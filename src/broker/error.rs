//! Broker error types

/// Error type for broker channel operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Connecting to the broker failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The shared connection or channel dropped
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A queue-level operation was rejected
    #[error("{op} failed on queue {queue}: {reason}")]
    Operation {
        op: &'static str,
        queue: String,
        reason: String,
    },
}

impl BrokerError {
    pub(crate) fn operation(op: &'static str, queue: &str, reason: impl ToString) -> Self {
        BrokerError::Operation {
            op,
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }
}
