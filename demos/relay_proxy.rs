//! Relay proxy example
//!
//! Runs the credential-hiding proxy configured from the environment
//! (`VIDU_SERVER`, `VIDU_KEY`, `VIDU_PRO_SERVER`, `VIDU_PRO_KEY`,
//! `OPENAI_API_BASE_URL`, `OPENAI_API_KEY`, `VIDU_PROXY_BIND`,
//! `VIDU_PROXY_TOKENS`) until Ctrl+C.
//!
//! After starting, you can:
//! - Check configuration via GET http://127.0.0.1:6790/vidu/health
//! - Fetch the OpenAPI document via GET http://127.0.0.1:6790/vidu/openapi.json
//! - Relay any API call, e.g. GET http://127.0.0.1:6790/vidu/ent/v2/generations/<id>

use std::sync::Arc;
use vidu_bridge::config::ProxyConfig;
use vidu_bridge::proxy::run_proxy_with_shutdown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = ProxyConfig::from_env()?;

    println!("Starting Vidu relay proxy on {}", config.bind_address);
    println!("  standard upstream: {}", config.standard_upstream());
    println!("  pro upstream:      {}", config.pro_upstream());
    if !config.access_tokens.is_empty() {
        println!("  access tokens required (x-ptoken header)");
    }
    println!();
    println!("  curl http://{}/vidu/health", config.bind_address);

    run_proxy_with_shutdown(Arc::new(config)).await?;
    Ok(())
}
