use std::sync::Arc;

use axum::{routing::get, Router};

use calendar_cell::{calendar_routes, CalendarClient};
use session_sync_cell::{import_routes, session_routes, watch_routes, webhook_routes, SyncState};
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    calendar: Arc<dyn CalendarClient>,
    state: Arc<SyncState>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "LV Notas API is running!" }))
        .nest(
            "/calendar",
            calendar_routes(config.clone(), calendar).merge(watch_routes(config.clone(), state.clone())),
        )
        .merge(webhook_routes(state.clone()))
        .nest("/import", import_routes(config.clone(), state.clone()))
        .nest("/sessions", session_routes(config, state))
}
