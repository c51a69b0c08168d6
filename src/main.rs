//! Bridge binary
//!
//! Reads the config file, connects to the broker and serves WebSocket
//! clients until Ctrl-C. Losing the broker connection terminates the
//! process with a failure status.

use std::process::ExitCode;
use std::sync::Arc;

use ws_mq_bridge::broker::AmqpBroker;
use ws_mq_bridge::pool::ConnectionPool;
use ws_mq_bridge::{logging, Bridge, BridgeConfig, BridgeServer, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Bridge terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BridgeConfig) -> Result<()> {
    let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);

    let pool = Arc::new(ConnectionPool::with_config(config.pool.clone()));
    let bridge = Bridge::new(pool, broker.clone(), config.broker.clone());
    let server = BridgeServer::new(config.server.clone(), bridge);

    tokio::select! {
        result = server.run_until(shutdown_signal()) => result?,
        failure = broker.failed() => return Err(failure.into()),
    }

    broker.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
