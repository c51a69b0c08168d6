//! WebSocket server
//!
//! [`BridgeServer`] accepts TCP connections, upgrades them to WebSocket and
//! hands every connection event to the [`Bridge`] coordinator.

pub mod config;
pub(crate) mod connection;
pub mod coordinator;
pub mod listener;

pub use config::ServerConfig;
pub use coordinator::Bridge;
pub use listener::BridgeServer;
