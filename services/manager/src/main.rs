//! drover manager
//!
//! The manager is the cluster's control plane: it accepts task
//! submissions over the control API, schedules them onto workers, and
//! runs the three reconciliation loops that converge stored state with
//! what workers report.

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use drover_manager::config::StoreKind;
use drover_manager::{
    api, Config, DispatchLoop, HealthCheckLoop, Manager, ManagerOptions, StatusSyncLoop,
    WorkerClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting drover manager");
    info!(
        listen_addr = %config.listen_addr,
        scheduler = ?config.scheduler,
        store = ?config.store,
        workers = config.workers.len(),
        "Configuration loaded"
    );

    let client = WorkerClient::new(config.worker_timeout);
    let options = ManagerOptions {
        dispatch_max_attempts: config.dispatch_max_attempts,
        max_restarts: config.max_restarts,
    };

    let manager = match config.store {
        StoreKind::Memory => Manager::in_memory(config.scheduler.build(), client, options),
        StoreKind::Sqlite => {
            match Manager::durable(&config.db_path, config.scheduler.build(), client, options) {
                Ok(manager) => {
                    info!(db_path = %config.db_path.display(), "Durable store opened");
                    manager
                }
                Err(e) => {
                    error!(error = %e, "Failed to open durable store");
                    return Err(e.into());
                }
            }
        }
    };

    for worker in &config.workers {
        manager.add_worker(worker.clone()).await;
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the dispatch loop in background
    let dispatch = DispatchLoop::new(manager.clone(), config.dispatch_interval);
    let dispatch_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            dispatch.run(shutdown_rx).await;
        }
    });

    // Start the status-sync loop in background
    let mut sync = StatusSyncLoop::new(
        manager.clone(),
        config.sync_interval,
        config.lost_task_grace_ticks,
    );
    let sync_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            sync.run(shutdown_rx).await;
        }
    });

    // Start the health-check loop in background
    let health = HealthCheckLoop::new(manager.clone(), config.health_interval);
    let health_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            health.run(shutdown_rx).await;
        }
    });

    // Build and run the server
    let app = api::create_router(manager);

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

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown; in-flight iterations finish rather than abort.
    let _ = shutdown_tx.send(true);

    info!("Waiting for loops to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, dispatch_handle).await {
        warn!(error = %e, "Dispatch loop did not shut down in time");
    }
    if let Err(e) = tokio::time::timeout(shutdown_timeout, sync_handle).await {
        warn!(error = %e, "Status-sync loop did not shut down in time");
    }
    if let Err(e) = tokio::time::timeout(shutdown_timeout, health_handle).await {
        warn!(error = %e, "Health-check loop did not shut down in time");
    }

    info!("Manager shutdown complete");
    Ok(())
}
