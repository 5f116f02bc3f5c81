use crate::health::{gateway_stream_status, health_handler, healthcheck};
use crate::relay::{chat_handler, gateway_stream_handler};
use crate::state::AppState;
use crate::stop::stop_handler;
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// All HTTP routes of the relay, with CORS open to any origin.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86_400));

    Router::new()
        .route("/api/rovo-chat", post(chat_handler))
        .route(
            "/api/ai-gateway/stream",
            get(gateway_stream_status).post(gateway_stream_handler),
        )
        .route("/api/stop", post(stop_handler))
        .route("/api/health", get(health_handler))
        .route("/healthcheck", get(healthcheck))
        .layer(cors)
        .with_state(state)
}
