//! WebSocket to AMQP topic bridge
//!
//! Each WebSocket client gets a dedicated broker queue named after its
//! connection identifier. Clients send `subscribe` / `unsubscribe` requests
//! which are translated into bindings of that queue on a shared topic
//! exchange; anything the broker routes to the queue is pushed back to the
//! client.
//!
//! # Architecture
//!
//! ```text
//!   WebSocket clients                                   AMQP broker
//!  ┌──────────────┐   on_message   ┌──────────────────┐  bind/unbind  ┌──────────┐
//!  │ conn (id=A)  │ ─────────────► │ SubscriptionConn │ ────────────► │ queue A  │
//!  │              │ ◄───────────── │   (id=A)         │ ◄──────────── │          │
//!  └──────────────┘    deliver     └──────────────────┘    consume    └──────────┘
//!                                          ▲
//!                                          │ register / unregister
//!                                  ┌───────┴────────┐
//!                                  │ ConnectionPool │── heartbeat / stats tasks
//!                                  └────────────────┘
//! ```
//!
//! The [`server::Bridge`] coordinator is the only component that sees both
//! the transport and the pool. The broker is reached through the
//! [`broker::BrokerChannel`] trait; [`broker::AmqpBroker`] implements it on
//! top of `lapin`.

pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod pool;
pub mod routing;
pub mod server;
pub mod stats;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use server::{Bridge, BridgeServer, ServerConfig};
