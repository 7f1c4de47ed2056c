//! Request authentication.
//!
//! Two credentials travel with each API request: the pre-shared key that admits
//! the caller to this backend, and the remote access token under which sync
//! operations run. Key comparison is constant-time.

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError, ErrorDetails, ErrorResponse};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the caller's remote access token.
pub const REMOTE_TOKEN_HEADER: &str = "x-remote-token";

/// PSK authentication layer. With no PSK configured every request passes.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    match presented_key(request.headers()) {
        Some(key) if constant_time_compare(key, &expected) => next.run(request).await,
        Some(_) => unauthorized_response(codes::INVALID_PSK, "Invalid API key"),
        None => unauthorized_response(codes::UNAUTHORIZED, "Missing API key"),
    }
}

/// API key from `x-api-key`, falling back to a bearer token.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Remote token for this request: the header if present, else the configured default.
pub fn remote_token(headers: &HeaderMap, default: Option<&str>) -> Result<String, AppError> {
    headers
        .get(REMOTE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(default)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Unauthorized(format!(
                "A remote access token is required ({} header)",
                REMOTE_TOKEN_HEADER
            ))
        })
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
