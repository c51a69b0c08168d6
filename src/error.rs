//! Crate-level error types

use crate::broker::BrokerError;

/// Errors surfaced by the bridge outside of the per-connection core.
///
/// Per-connection broker and transport failures are logged and swallowed;
/// only bootstrap problems and broker connection loss end up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
