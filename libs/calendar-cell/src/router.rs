use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::CalendarClient;

pub struct CalendarState {
    pub client: Arc<dyn CalendarClient>,
}

pub fn calendar_routes(config: Arc<AppConfig>, client: Arc<dyn CalendarClient>) -> Router {
    let state = Arc::new(CalendarState { client });

    Router::new()
        .route("/events", get(handlers::get_events_for_import))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
