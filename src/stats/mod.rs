//! Statistics for the connection pool

pub mod metrics;

pub use metrics::PoolStats;
