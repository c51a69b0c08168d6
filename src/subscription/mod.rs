//! Per-connection subscription state machine
//!
//! A [`SubscriptionConnection`] turns client subscribe/unsubscribe requests
//! into bindings of its own broker queue and pushes whatever arrives on that
//! queue back out through its [`ClientSink`].

pub mod connection;
pub mod sink;
pub mod state;

pub use connection::SubscriptionConnection;
pub use sink::{ChannelSink, ClientSink, SinkError};
pub use state::{Lifecycle, SubscriptionState};
