use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

use crate::handlers::api::{
    get_negotiation, meeting_response, meeting_status, schedule_meeting, AppState,
};
use crate::handlers::test::health_check;

pub fn create_router(app_state: Arc<AppState>, is_production: bool) -> Router {
    let mut router = Router::new();

    // Health check is always available
    let health_route = Router::new().route("/health", get(health_check));
    router = router.merge(health_route);

    // Response webhook is always available; proposal cards link straight to it
    let webhook_route = Router::new().route("/webhook/response", get(meeting_response));
    router = router.merge(webhook_route);

    // Scheduling API
    let api_routes = Router::new()
        .route("/meetings/schedule", post(schedule_meeting))
        .route("/meeting-status/:uuid", get(meeting_status));
    router = router.merge(api_routes);

    // Only expose the raw negotiation dump if not in production mode
    if !is_production {
        let debug_routes = Router::new().route("/negotiations/:uuid", get(get_negotiation));
        router = router.merge(debug_routes);

        info!("Debug routes enabled - server running in development mode");
    } else {
        info!("Running in production mode - debug routes disabled");
    }

    router.with_state(app_state)
}
