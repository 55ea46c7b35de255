//! drover worker agent
//!
//! Runs on each node: accepts task assignments from the manager, starts
//! them as containers via the configured runtime, and serves the status,
//! health, and stats endpoints the manager's reconciliation loops poll.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drover_worker::config::{Config, RuntimeKind};
use drover_worker::runtime::{ContainerRuntime, DockerRuntime, MockRuntime};
use drover_worker::{api, Executor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting drover worker agent");
    info!(
        listen_addr = %config.listen_addr,
        runtime = ?config.runtime,
        "Configuration loaded"
    );

    let runtime: Arc<dyn ContainerRuntime> = match config.runtime {
        RuntimeKind::Docker => Arc::new(DockerRuntime::connect()?),
        RuntimeKind::Mock => Arc::new(MockRuntime::new()),
    };

    let executor = Arc::new(Executor::new(runtime));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the executor loop
    let executor_handle = tokio::spawn({
        let executor = Arc::clone(&executor);
        let shutdown_rx = shutdown_rx.clone();
        let interval = config.tick_interval;
        async move {
            executor.run(interval, shutdown_rx).await;
        }
    });

    // Serve the agent API
    let app = api::router(Arc::clone(&executor));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => tracing::error!(error = %e, "Server error"),
                Err(e) => tracing::error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Let the executor finish its in-flight iteration
    let _ = shutdown_tx.send(true);
    info!("Waiting for executor to shut down...");
    if let Err(e) =
        tokio::time::timeout(std::time::Duration::from_secs(10), executor_handle).await
    {
        tracing::warn!(error = %e, "Executor did not shut down in time");
    }

    info!("Worker agent shutdown complete");
    Ok(())
}
