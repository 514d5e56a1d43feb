use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use metrics_agent::api::{ApiServer, AppState};
use metrics_agent::config::AgentConfig;
use metrics_agent::engine::{Engine, watcher};
use metrics_agent::{logging, plugins};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AgentConfig::from_env_or_file().context("failed to load configuration")?;

    let (logging_handle, _log_guard) =
        logging::init_logging(&config.logging).context("failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting metrics-agent");

    let cancel = CancellationToken::new();
    logging_handle.start_retention_cleanup(cancel.clone());

    let engine = Arc::new(Engine::new(config.engine.clone()));
    plugins::register_builtin(&engine)?;

    if let Err(e) = engine.initialize_from_config(&config.plugins).await {
        tracing::error!(error = %e, "Startup failed");
        engine.shutdown().await;
        return Err(e.into());
    }

    let schedules = engine.start_schedulers().await;
    tracing::info!(schedules, "Collection started");

    let watcher_handle = config.engine.health_watch_interval().map(|interval| {
        watcher::spawn_health_watcher(Arc::clone(&engine), interval, cancel.clone())
    });

    let api = if config.api.enabled {
        let server = Arc::new(ApiServer::new(
            config.api.clone().into(),
            AppState::with_engine(Arc::clone(&engine)),
        ));
        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            if let Err(e) = running.run().await {
                tracing::error!(error = %e, "Status API failed");
            }
        });
        Some((server, handle))
    } else {
        None
    };

    shutdown_signal().await;

    cancel.cancel();
    if let Some((server, handle)) = api {
        server.shutdown();
        let _ = handle.await;
    }
    if let Some(handle) = watcher_handle {
        let _ = handle.await;
    }

    engine.shutdown().await;
    tracing::info!("metrics-agent stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}
