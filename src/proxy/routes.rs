//! Route handlers for the relay proxy
//!
//! Relay handlers forward the request to the configured upstream with the
//! service credentials attached server-side. The browser never sees a key
//! and its own credential headers never reach the upstream.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{HEADER_AUTHORIZATION, HEADER_CTOKEN, HEADER_PTOKEN, HEADER_VTOKEN};
use crate::error::ApiError;

use super::ProxyState;

/// Header naming the API version expected by the upstream
pub const HEADER_VIDU_VERSION: &str = "x-vidu-version";
/// Header marking requests relayed through the pro tier
pub const HEADER_VIDU_TIER: &str = "x-vidu-tier";

/// Inbound headers never relayed upstream
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    "cookie",
    HEADER_AUTHORIZATION,
    HEADER_PTOKEN,
    HEADER_VTOKEN,
    HEADER_CTOKEN,
];

/// Upstream response headers not copied back to the caller
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Which upstream a relay request goes to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// `/vidu/*`
    Standard,
    /// `/pro/vidu/*`
    Pro,
}

/// Health report; reflects configuration only
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always "vidu"
    pub service: String,
    /// "available" when both server and key are configured, else "unavailable"
    pub status: String,
    /// What is configured
    pub config: HealthConfig,
    /// RFC 3339 time of the report
    pub timestamp: String,
}

/// Configuration flags reported by the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthConfig {
    /// An upstream server is configured
    pub has_server: bool,
    /// A service key is configured
    pub has_key: bool,
    /// A dedicated pro server and key are configured
    pub has_pro: bool,
    /// Proxy version
    pub version: String,
}

/// Path to request upstream for an inbound path (query included)
///
/// Official `vidu.com` hosts serve the API at the root, so the `/vidu` prefix
/// is dropped for them; other upstreams get the path unchanged. Pro requests
/// lose `/pro/vidu` on `pro.vidu.com` and are mapped to `/pro` elsewhere.
pub fn upstream_path(tier: Tier, upstream: &str, original: &str) -> String {
    let rewritten = match tier {
        Tier::Standard if upstream.contains("vidu.com") => original.replacen("/vidu", "", 1),
        Tier::Standard => original.to_string(),
        Tier::Pro if upstream.contains("pro.vidu.com") => original.replacen("/pro/vidu", "", 1),
        Tier::Pro => original.replacen("/pro/vidu", "/pro", 1),
    };

    if rewritten.is_empty() || rewritten.starts_with('?') {
        format!("/{rewritten}")
    } else {
        rewritten
    }
}

/// ANY /vidu/{path} - Relay to the standard upstream
#[utoipa::path(
    post,
    path = "/vidu/{path}",
    tag = "relay",
    params(("path" = String, Path, description = "Upstream API path; any method is relayed")),
    responses(
        (status = 200, description = "Upstream response, relayed unchanged"),
        (status = 401, description = "Missing or invalid access token", body = ApiError),
        (status = 502, description = "Upstream unreachable", body = ApiError)
    )
)]
pub async fn relay_standard(
    State(state): State<ProxyState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay(&state, Tier::Standard, method, &uri, &headers, body).await
}

/// ANY /pro/vidu/{path} - Relay to the pro upstream
#[utoipa::path(
    post,
    path = "/pro/vidu/{path}",
    tag = "relay",
    params(("path" = String, Path, description = "Upstream API path; any method is relayed")),
    responses(
        (status = 200, description = "Upstream response, relayed unchanged"),
        (status = 401, description = "Missing or invalid access token", body = ApiError),
        (status = 502, description = "Upstream unreachable", body = ApiError)
    )
)]
pub async fn relay_pro(
    State(state): State<ProxyState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay(&state, Tier::Pro, method, &uri, &headers, body).await
}

async fn relay(
    state: &ProxyState,
    tier: Tier,
    method: Method,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let config = &state.config;
    let (upstream, key) = match tier {
        Tier::Standard => (config.standard_upstream(), config.standard_key()),
        Tier::Pro => (config.pro_upstream(), config.pro_key()),
    };

    let original = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let path = upstream_path(tier, upstream, original);
    let url = format!("{}{}", upstream.trim_end_matches('/'), path);

    let Ok(upstream_method) = reqwest::Method::from_bytes(method.as_str().as_bytes()) else {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(ApiError::new("method_not_allowed", "Unsupported method")),
        )
            .into_response();
    };

    let outbound = outbound_headers(headers, tier, key, &config.api_version);
    tracing::debug!(method = %method, url = %url, ?tier, "relaying request");

    let result = state
        .http
        .request(upstream_method, &url)
        .headers(outbound)
        .body(body.to_vec())
        .send()
        .await;

    let upstream_response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Vidu upstream request failed");
            return upstream_unavailable(&e.to_string());
        }
    };

    let status = upstream_response.status().as_u16();
    let response_headers = upstream_response.headers().clone();
    let bytes = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "failed to read Vidu upstream response");
            return upstream_unavailable(&e.to_string());
        }
    };

    tracing::info!(status, path = %original, "Vidu API response");

    let mut response = Response::new(Body::from(bytes.to_vec()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    for (name, value) in response_headers.iter() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response.headers_mut().append(name, value);
        }
    }
    response
}

/// Header set sent upstream
///
/// Inbound headers minus hop-by-hop and credential headers, then the service
/// bearer key, version headers and a content type: multipart bodies keep
/// their boundary, anything else is sent as JSON.
fn outbound_headers(
    inbound: &HeaderMap,
    tier: Tier,
    key: Option<&str>,
    api_version: &str,
) -> reqwest::header::HeaderMap {
    use reqwest::header::{HeaderName, HeaderValue};

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in inbound.iter() {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let inbound_type = inbound
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let content_type = if inbound_type.starts_with("multipart/") {
        inbound_type.to_string()
    } else {
        "application/json".to_string()
    };

    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    set("content-type", content_type);
    set(HEADER_VIDU_VERSION, api_version.to_string());
    set(
        "user-agent",
        format!("vidu-bridge/{}", env!("CARGO_PKG_VERSION")),
    );
    if let Some(key) = key {
        set(HEADER_AUTHORIZATION, format!("Bearer {key}"));
    }
    if tier == Tier::Pro {
        set(HEADER_VIDU_TIER, "pro".to_string());
    }

    headers
}

fn upstream_unavailable(message: &str) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(ApiError::upstream_unavailable(format!(
            "Vidu service unavailable: {message}"
        ))),
    )
        .into_response()
}

/// GET /vidu/health - Configuration health report
#[utoipa::path(
    get,
    path = "/vidu/health",
    tag = "system",
    responses(
        (status = 200, description = "What the proxy is configured with", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<ProxyState>) -> impl IntoResponse {
    let config = &state.config;
    let has_server = config.server.is_some();
    let has_key = config.api_key.is_some();

    Json(HealthResponse {
        service: "vidu".to_string(),
        status: if has_server && has_key {
            "available"
        } else {
            "unavailable"
        }
        .to_string(),
        config: HealthConfig {
            has_server,
            has_key,
            has_pro: config.has_pro(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /vidu/openapi.json - OpenAPI document of the proxy endpoints
#[utoipa::path(
    get,
    path = "/vidu/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3 document in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use super::openapi::ProxyDoc;
    use utoipa::OpenApi;

    Json(ProxyDoc::openapi())
}
