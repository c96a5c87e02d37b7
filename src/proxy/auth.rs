//! Access-token middleware for the relay routes
//!
//! When `ProxyConfig::access_tokens` is non-empty, every relayed request must
//! carry one of the tokens in the `x-ptoken` header or it receives a 401.
//! The header is consumed here and never forwarded upstream.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::HEADER_PTOKEN;
use crate::error::ApiError;

/// Reject requests whose `x-ptoken` header matches none of the allowed tokens
///
/// An empty token list lets every request through.
pub async fn require_access_token(
    State(tokens): State<Arc<Vec<String>>>,
    request: Request,
    next: Next,
) -> Response {
    if tokens.is_empty() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(HEADER_PTOKEN)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(token)
            if tokens
                .iter()
                .any(|allowed| constant_time_eq(token.as_bytes(), allowed.as_bytes())) =>
        {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid access token"),
        None => unauthorized_response("Missing x-ptoken header"),
    }
}

/// Constant-time byte comparison; every byte is compared regardless of where
/// the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
