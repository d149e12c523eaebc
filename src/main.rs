use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{error_handling::HandleErrorLayer, http::StatusCode};
use tower::{BoxError, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

use graph_scheduler_service::{
    create_router,
    services::ingestor::ResponseIngestor,
    services::notifier::NotificationDispatcher,
    services::state_machine::NegotiationEngine,
    services::store::create_negotiation_store,
    services::supervisor::PollSupervisor,
    AppState, GraphClient,
};

// Error handler
async fn handle_error(error: BoxError) -> (StatusCode, String) {
    if error.is::<tokio::time::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            "Request took too long".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {}", error),
        )
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Initialize the Microsoft Graph client
    let graph = Arc::new(GraphClient::new());

    // Public base URL that proposal card buttons link back to
    let webhook_base_url =
        env::var("WEBHOOK_BASE_URL").expect("WEBHOOK_BASE_URL must be set in environment");

    // Poll cadence for response evaluation
    let poll_interval = env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(30);

    info!("Evaluating negotiations every {} seconds", poll_interval);

    // Initialize the negotiation store
    let store = create_negotiation_store();
    info!("Negotiation store initialized");

    // Check if running in production mode
    let is_production = env::var("ENVIRONMENT")
        .map(|val| val.to_lowercase() == "production")
        .unwrap_or(false);

    if is_production {
        info!("Running in PRODUCTION mode - restricting available endpoints");
    } else {
        info!("Running in DEVELOPMENT mode - all endpoints will be available");
    }

    let notifier = NotificationDispatcher::new(webhook_base_url);
    let engine = Arc::new(NegotiationEngine::new(
        graph,
        Arc::clone(&store),
        notifier,
    ));
    let supervisor = Arc::new(PollSupervisor::new(
        Arc::clone(&engine),
        Duration::from_secs(poll_interval),
    ));

    // Resume polling for negotiations that were in flight at last shutdown
    let waiting = store.waiting_ids();
    if !waiting.is_empty() {
        info!("Resuming {} in-flight negotiations", waiting.len());
        for id in waiting {
            supervisor.spawn_poller(id);
        }
    }

    // Create shared application state
    let ingestor = ResponseIngestor::new(Arc::clone(&store));
    let app_state = Arc::new(AppState {
        engine,
        store,
        ingestor,
        supervisor: Arc::clone(&supervisor),
    });

    // Create router with appropriate routes based on environment
    let app = create_router(app_state, is_production).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_error))
            .load_shed()
            .concurrency_limit(64)
            .timeout(Duration::from_secs(10))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any)),
    );

    // Bind to port 3000
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    // Set up signal handler for graceful shutdown
    let shutdown = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received interrupt signal, starting graceful shutdown");
            },
            _ = terminate => {
                info!("Received terminate signal, starting graceful shutdown");
            },
        }
    };

    // Start server with graceful shutdown
    info!("Server is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Failed to start server");

    supervisor.shutdown();
    info!("Server has been gracefully shut down");
}
