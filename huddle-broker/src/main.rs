//! `Huddle` broker -- stateless topic fan-out over WebSocket.
//!
//! Peers connect, subscribe to a shared topic, and publish flat string
//! payloads. The broker forwards every publish to every subscriber of the
//! topic, publisher included. It keeps no history and applies no
//! membership logic; presence is worked out entirely by the clients.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9000
//! cargo run --bin huddle-broker
//!
//! # Run on custom address
//! cargo run --bin huddle-broker -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! HUDDLE_BROKER_ADDR=127.0.0.1:8080 cargo run --bin huddle-broker
//! ```
//!
//! Ctrl+C sends a close frame to every connected client before exiting.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use huddle_broker::broker::{self, BrokerState};
use huddle_broker::config::{BrokerCliArgs, BrokerConfig};

/// Time given to writer tasks to flush close frames before exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    let cli = BrokerCliArgs::parse();

    let config = match BrokerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        max_payload_size = config.max_payload_size,
        "starting huddle broker"
    );

    let state = Arc::new(BrokerState::with_max_payload_size(config.max_payload_size));
    let bind_addr = config.bind_addr.to_string();

    let (bound_addr, mut handle) =
        match broker::start_server_with_state(&bind_addr, Arc::clone(&state)).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "failed to start broker");
                std::process::exit(1);
            }
        };
    tracing::info!(addr = %bound_addr, "broker listening");

    tokio::select! {
        result = &mut handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "broker server task failed");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "broker server task failed");
                }
                return;
            }
            let closed = state.close_all_connections().await;
            tracing::info!(connections = closed, "shutting down");
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            handle.abort();
        }
    }
}
