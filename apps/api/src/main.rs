use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use calendar_cell::GoogleCalendarClient;
use session_sync_cell::{PgSessionStore, SyncState};
use shared_config::AppConfig;
use shared_utils::clock::system_clock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LV Notas API server");

    let config = Arc::new(AppConfig::from_env());
    if !config.is_google_configured() {
        warn!("Google service account is not configured, calendar calls will fail");
    }

    let pool = shared_database::connect(&config).await?;
    shared_database::run_migrations(&pool).await?;

    let clock = system_clock();
    let calendar = Arc::new(GoogleCalendarClient::new(&config, clock.clone()));
    let store = Arc::new(PgSessionStore::new(pool));
    let webhook_url = config
        .is_webhook_configured()
        .then(|| config.webhook_url.clone());
    let state = Arc::new(SyncState::new(store, calendar.clone(), clock, webhook_url));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), calendar, state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
