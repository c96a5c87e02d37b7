//! Credential-hiding relay proxy
//!
//! Browser-side code calls this server instead of the Vidu API. The proxy
//! rewrites paths to the configured upstream and injects the service key, so
//! the key never leaves the server.

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{any, get},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ProxyDoc;
pub use state::ProxyState;

/// Create the proxy router
///
/// # Routes
///
/// - `ANY /vidu/*path` - Relay to the standard upstream
/// - `ANY /pro/vidu/*path` - Relay to the pro upstream (larger body limit)
/// - `GET /vidu/health` - Configuration health report
/// - `GET /vidu/openapi.json` - OpenAPI document
///
/// The access-token check, when tokens are configured, guards the relay
/// routes only.
pub fn create_router(config: Arc<ProxyConfig>) -> Result<Router> {
    let state = ProxyState::new(config.clone())?;
    let tokens = Arc::new(config.access_tokens.clone());

    let relay = Router::new()
        .route(
            "/vidu/*path",
            any(routes::relay_standard).layer(DefaultBodyLimit::max(config.body_limit)),
        )
        .route(
            "/pro/vidu/*path",
            any(routes::relay_pro).layer(DefaultBodyLimit::max(config.pro_body_limit)),
        )
        .route_layer(middleware::from_fn_with_state(
            tokens,
            auth::require_access_token,
        ));

    let router = Router::new()
        .route("/vidu/health", get(routes::health_check))
        .route("/vidu/openapi.json", get(routes::openapi_spec))
        .merge(relay)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        Ok(router.layer(build_cors_layer(&config.cors_origins)))
    } else {
        Ok(router)
    }
}

/// Build a CORS layer allowing the configured origins ("*" for any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the proxy on an already bound listener until `shutdown` resolves
pub async fn serve_proxy<F>(listener: TcpListener, config: Arc<ProxyConfig>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(config)?;

    if let Ok(address) = listener.local_addr() {
        tracing::info!(address = %address, "Relay proxy listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::ProxyServer(e.to_string()))?;

    tracing::info!("Relay proxy stopped");
    Ok(())
}

/// Start the proxy on the configured bind address; runs until the server fails
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vidu_bridge::config::ProxyConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(ProxyConfig::from_env()?);
/// vidu_bridge::proxy::start_proxy_server(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_proxy_server(config: Arc<ProxyConfig>) -> Result<()> {
    let bind_address = config.bind_address;
    tracing::info!(address = %bind_address, "Starting relay proxy");

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    serve_proxy(listener, config, std::future::pending()).await
}

/// Start the proxy and stop it gracefully on SIGTERM or SIGINT
pub async fn run_proxy_with_shutdown(config: Arc<ProxyConfig>) -> Result<()> {
    let bind_address = config.bind_address;
    tracing::info!(address = %bind_address, "Starting relay proxy");

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    serve_proxy(listener, config, crate::wait_for_signal()).await
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
