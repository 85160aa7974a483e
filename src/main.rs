use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use menti::core::auth::{JwtConfig, JwtService};
use menti::core::config::Config;
use menti::core::db::create_pool_with_migrations;
use menti::core::matchmaking::{MatchmakingState, matchmaking_router};
use menti::core::store::{MemoryProfileStore, PgProfileStore, ProfileStore};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// How often expired cookie sessions are purged
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("menti=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = Config::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        database = config.has_database(),
        secret_key = config.secret_key.is_some(),
        cors_origin = ?config.cors_origin,
        "Config loaded"
    );

    let store: Arc<dyn ProfileStore> = match config.db_config() {
        Some(db_config) => {
            let pool = create_pool_with_migrations(&db_config).await?;
            let store = PgProfileStore::new(pool);
            spawn_session_purge(store.clone());
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory profile store");
            Arc::new(MemoryProfileStore::new())
        }
    };

    let jwt = match config.jwt_secret() {
        Some(secret) => Some(JwtService::new(JwtConfig::new(secret))),
        None => {
            tracing::warn!("SECRET_KEY not set, access tokens will not be accepted");
            None
        }
    };

    let state = MatchmakingState::new(store, jwt)
        .with_rate_limit(config.ws_messages_per_second, config.ws_burst());
    state.start().await;

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::permissive(),
    };

    let app = matchmaking_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.site_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    tracing::info!("WebSocket: ws://{}/ws", listener.local_addr()?);

    let shutdown_state = state.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Received shutdown signal, disconnecting everyone...");
        // Closing every mailbox ends the upgraded sockets so serve can finish
        shutdown_state.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn spawn_session_purge(store: PgProfileStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired sessions"),
            }
        }
    });
}
