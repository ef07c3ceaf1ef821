use session_service::{
    build_router,
    config::{SessionServiceConfig, StoreBackend},
    services::{AuditLog, InMemoryUserDirectory, PgUserDirectory, UserDirectory},
    store::{KeyValueStore, MemoryStore, RedisStore},
    AppState,
};
use service_core::observability::logging::init_tracing;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const AUDIT_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = SessionServiceConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store,
        "Starting session service"
    );

    let store: Arc<dyn KeyValueStore> = match config.store {
        StoreBackend::Redis => Arc::new(RedisStore::new(&config.redis).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-process session store; state is not shared between instances");
            Arc::new(MemoryStore::new())
        }
    };

    let users: Arc<dyn UserDirectory> = match &config.database.url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Postgres: {}", e))?;
            tracing::info!("User directory connected to Postgres");
            Arc::new(PgUserDirectory::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using an empty in-memory user directory");
            Arc::new(InMemoryUserDirectory::new())
        }
    };

    spawn_audit_pruner(AuditLog::new(store.clone(), config.session.audit_retention()));

    let state = AppState::new(config.clone(), store, users);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn spawn_audit_pruner(audit: AuditLog) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(AUDIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = audit.prune().await {
                tracing::warn!(error = %e, "Audit retention pass failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
