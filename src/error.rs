use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("ASAP_PRIVATE_KEY not found in environment")]
    MissingKey,
    #[error("Missing ASAP configuration: ASAP_ISSUER and ASAP_KID must be set")]
    MissingConfig,
    #[error("Private key is neither PEM nor base64-encoded PEM")]
    KeyEncoding,
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Failures of the relay before its event stream starts. Once the stream
/// is open, problems are reported inside the stream instead.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Message is required")]
    MissingMessage,
    #[error("Server configuration error")]
    MissingGatewayUrl,
    #[error("Authentication failed: {0}")]
    Token(#[from] TokenError),
    #[error("AI gateway returned {status}")]
    UpstreamStatus { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::MissingMessage => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Message is required"}),
            ),
            Self::MissingGatewayUrl => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Server configuration error"}),
            ),
            Self::Token(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Authentication failed", "details": e.to_string()}),
            ),
            Self::UpstreamStatus { status, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Failed to get AI response", "status": status}),
            ),
            Self::Http(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Internal server error", "details": e.to_string()}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
}
