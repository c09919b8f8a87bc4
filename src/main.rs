//! Trivia session backend binary entrypoint wiring REST, WebSocket, SSE and storage layers.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_session_back::{
    config::{self, AppConfig, StorageConfig},
    dao::session_store::{StoreHandles, memory::MemoryStore},
    routes,
    services::live_updates,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = AppConfig::load();
    let storage = app_config.storage.clone();
    let app_state = AppState::new(app_config);

    let live_rx = app_state
        .take_live_receiver()
        .await
        .context("live update queue already taken")?;
    live_updates::spawn(app_state.clone(), live_rx);

    start_storage(&app_state, storage).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config::server_port()));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the memory store right away, or supervise a MongoDB connection in the background.
async fn start_storage(state: &SharedState, storage: StorageConfig) -> anyhow::Result<()> {
    match storage {
        StorageConfig::Memory => {
            info!("using in-memory storage");
            state
                .install_stores(StoreHandles::from_store(MemoryStore::new()))
                .await;
            Ok(())
        }
        #[cfg(feature = "mongo-store")]
        StorageConfig::Mongo { uri, database } => {
            use trivia_session_back::{
                dao::{
                    session_store::mongodb::{MongoConfig, MongoSessionStore},
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            info!(database = ?database, "using MongoDB storage; starting in degraded mode");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let uri = uri.clone();
                let database = database.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, database.as_deref()).await?;
                    let store = MongoSessionStore::connect(config).await?;
                    Ok::<_, StorageError>(StoreHandles::from_store(store))
                }
            }));
            Ok(())
        }
        #[cfg(not(feature = "mongo-store"))]
        StorageConfig::Mongo { .. } => {
            anyhow::bail!("MongoDB storage selected but the `mongo-store` feature is disabled")
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
