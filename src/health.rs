use crate::state::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

pub async fn healthcheck() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn set_or_missing(value: &Option<String>) -> &'static str {
    if value.is_some() { "SET" } else { "MISSING" }
}

/// Reports which settings are present, never their values.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(json!({
        "status": "OK",
        "message": "Rovo relay server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "authMethod": "ASAP",
        "debugMode": config.debug,
        "envCheck": {
            "AI_GATEWAY_URL": set_or_missing(&config.gateway.url),
            "AI_GATEWAY_USE_CASE_ID": set_or_missing(&config.gateway.use_case_id),
            "AI_GATEWAY_CLOUD_ID": set_or_missing(&config.gateway.cloud_id),
            "AI_GATEWAY_USER_ID": set_or_missing(&config.gateway.user_id),
            "ASAP_ISSUER": set_or_missing(&config.asap.issuer),
            "ASAP_KID": set_or_missing(&config.asap.kid),
            "ASAP_PRIVATE_KEY": set_or_missing(&config.asap.private_key),
        },
    }))
}

pub async fn gateway_stream_status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "endpoint": "/api/ai-gateway/stream",
        "message": "AI Gateway streaming proxy is ready",
    }))
}
