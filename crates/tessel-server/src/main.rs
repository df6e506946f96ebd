mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tessel_api::auth::{AppState, AppStateInner};
use tessel_gateway::ChatContext;
use tessel_gateway::auth::SessionAuthenticator;
use tessel_gateway::dispatcher::Dispatcher;
use tessel_gateway::store::Store;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessel=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == "dev-secret-change-me" {
        warn!("TESSEL_JWT_SECRET is not set, using the development secret");
    }

    // Init database
    let db = tessel_db::Database::open(&config.db_path)?;
    let store = Store::new(db);

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        ctx: ChatContext::new(store.clone(), Dispatcher::new()),
        authenticator: SessionAuthenticator::new(config.jwt_secret.clone(), store),
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
    });

    let app = tessel_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Tessel server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
