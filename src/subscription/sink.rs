//! Outbound side of a client connection

use bytes::Bytes;
use tokio::sync::mpsc;

/// Write failure on a client sink
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("outbound buffer full")]
    Full,
}

/// Where messages for a client are written
///
/// `send` must not block; delivery is best-effort.
pub trait ClientSink: Send + Sync {
    /// Whether the connection still accepts writes
    fn is_writable(&self) -> bool;

    /// Queue a payload for the client
    fn send(&self, payload: Bytes) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel drained by the connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver its writer task drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ClientSink for ChannelSink {
    fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
