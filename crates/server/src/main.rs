//! schoolhouse server entry point.
//!
//! Loads configuration, connects to the database, brings the schema up to
//! date and serves the API until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use schoolhouse_core::migrate::source;
use schoolhouse_core::{AppConfig, Database, MigrationRunner};
use schoolhouse_server::startup::ensure_schema;
use schoolhouse_server::{AppState, build_app};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let db = Database::connect(&config.db_path, &config.retry_policy())
        .await
        .context("connecting to database")?;

    let steps = source::load(config.migrations_dir.as_deref()).context("loading migrations")?;
    let runner = MigrationRunner::new(&db, steps);
    ensure_schema(&runner, config.auto_migrate)
        .await
        .context("schema is not ready")?;

    match db.purge_expired_sessions().await {
        Ok(purged) => tracing::info!(purged, "expired sessions removed"),
        Err(e) => tracing::warn!(error = %e, "failed to purge expired sessions"),
    }

    let app = build_app(AppState::new(db, &config));
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, cache = config.cache.enabled, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
