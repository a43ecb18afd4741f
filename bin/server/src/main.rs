use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uitid_connect_identity::{MemoryStore, SessionStore};
use uitid_connect_server::{
    app,
    auth::{AppSettings, AppState, PgStore, UitidClient},
    config::ServerConfig,
    error::StartupError,
};

#[tokio::main]
async fn main() -> uitid_connect_core::Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Configuration {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let settings = AppSettings::from_config(&config).map_err(|e| StartupError::Configuration {
        details: format!("invalid base_url: {e}"),
    })?;

    let client = UitidClient::new(&config.provider).map_err(|e| StartupError::Provider {
        details: e.to_string(),
    })?;
    let client = Arc::new(client);

    let state = match &config.database_url {
        Some(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .map_err(|e| StartupError::Database {
                    details: e.to_string(),
                })?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|e| StartupError::Database {
                    details: e.to_string(),
                })?;

            let store = Arc::new(PgStore::new(db_pool));
            start_session_cleanup(store.clone(), config.session.cleanup_interval_seconds).await;
            AppState::new(store, client, settings)
        }
        None => {
            tracing::warn!("No database_url configured, keeping sessions in memory");
            let store = Arc::new(MemoryStore::new());
            start_session_cleanup(store.clone(), config.session.cleanup_interval_seconds).await;
            AppState::new(store, client, settings)
        }
    };

    let app = app::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| StartupError::Serve {
            details: format!("failed to bind to {}: {e}", config.listen_addr),
        })?;

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    Ok(())
}

/// Deletes expired sessions once now, then every `interval_secs` in the
/// background.
async fn start_session_cleanup<S: SessionStore + 'static>(store: Arc<S>, interval_secs: u64) {
    match store.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(
                deleted_sessions = count,
                "Cleaned up expired sessions on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions on startup");
        }
    }

    let sessions: Arc<dyn SessionStore> = store;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately; startup cleanup already ran.
        interval.tick().await;
        loop {
            interval.tick().await;
            match sessions.delete_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
