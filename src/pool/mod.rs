//! Connection pool
//!
//! The pool tracks every live [`SubscriptionConnection`] by its connection
//! identifier. It owns no broker state; besides registration it only drives
//! two periodic sweeps:
//!
//! ```text
//!                   Arc<ConnectionPool>
//!              ┌──────────────────────────┐
//!              │ connections: HashMap<Id, │
//!              │   Arc<SubscriptionConn>> │
//!              └─────┬──────────────┬─────┘
//!                    │ snapshot     │ snapshot
//!                    ▼              ▼
//!            heartbeat task     stats task
//!          (ping every conn)  (log counts)
//! ```
//!
//! [`SubscriptionConnection`]: crate::subscription::SubscriptionConnection

pub mod config;
pub mod store;

pub use config::PoolConfig;
pub use store::ConnectionPool;
