// libs/session-sync-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use calendar_cell::CalendarClient;
use shared_config::AppConfig;
use shared_utils::{extractor::auth_middleware, Clock};

use crate::handlers;
use crate::services::{BulkImportService, CalendarSyncService, SessionService, SessionStore};

pub struct SyncState {
    pub sync: Arc<CalendarSyncService>,
    pub import: BulkImportService,
    pub sessions: SessionService,
}

impl SyncState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        calendar: Arc<dyn CalendarClient>,
        clock: Arc<dyn Clock>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            sync: Arc::new(CalendarSyncService::new(
                store.clone(),
                calendar,
                clock.clone(),
                webhook_url,
            )),
            import: BulkImportService::new(store.clone(), clock.clone()),
            sessions: SessionService::new(store, clock),
        }
    }
}

/// Google push endpoint. Unauthenticated: Google cannot send our bearer token.
pub fn webhook_routes(state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/webhook", post(handlers::receive_webhook))
        .with_state(state)
}

pub fn import_routes(config: Arc<AppConfig>, state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/patient", post(handlers::import_patient))
        .route("/events", post(handlers::import_events))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

pub fn session_routes(config: Arc<AppConfig>, state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_sessions))
        .route("/calendar-only", get(handlers::list_calendar_only_events))
        .route("/{session_id}/status", patch(handlers::update_session_status))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

pub fn watch_routes(config: Arc<AppConfig>, state: Arc<SyncState>) -> Router {
    Router::new()
        .route("/watch", post(handlers::create_watch))
        .route("/watch/{channel_id}", delete(handlers::stop_watch))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
