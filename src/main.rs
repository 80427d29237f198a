use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use villabook::config::Config;
use villabook::engine::Engine;
use villabook::notify::NotifyHub;
use villabook::store::WalStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    villabook::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let engine = Arc::new(Engine::new(store.clone(), config.policy(), Arc::new(NotifyHub::new())));
    tokio::spawn(villabook::compactor::run_compactor(
        store,
        engine.clone(),
        config.compact_threshold,
    ));

    let app = villabook::api::router(engine);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("villabook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  environment: {}", config.environment);
    info!("  default horizon: {} months", config.default_horizon_months);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("villabook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM; in-flight requests drain before serve returns.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
