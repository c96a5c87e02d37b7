//! Common test utilities for vidu-bridge integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use vidu_bridge::config::{ApiConfig, PollingConfig, ProxyConfig};
use vidu_bridge::{Config, PollTiming};
use wiremock::{Request, Respond, ResponseTemplate};

/// Replies with each JSON body in turn, repeating the last one
pub struct Sequence {
    bodies: Vec<Value>,
    calls: AtomicUsize,
}

impl Sequence {
    pub fn new(bodies: Vec<Value>) -> Self {
        Self {
            bodies,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let body = &self.bodies[call.min(self.bodies.len() - 1)];
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// A running relay proxy; dropping the handle leaves it running until the
/// test runtime ends
pub struct RunningProxy {
    pub address: SocketAddr,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<vidu_bridge::Result<()>>,
}

impl RunningProxy {
    pub fn origin(&self) -> String {
        format!("http://{}", self.address)
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        self.server.await.unwrap().unwrap();
    }
}

/// Serve a relay proxy on an ephemeral port
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(vidu_bridge::proxy::serve_proxy(
        listener,
        Arc::new(config),
        async move {
            stop_rx.await.ok();
        },
    ));

    RunningProxy {
        address,
        stop: Some(stop_tx),
        server,
    }
}

/// Millisecond polling so sequences finish quickly
pub fn fast_timing() -> PollTiming {
    PollTiming {
        max_attempts: 20,
        interval: Duration::from_millis(5),
        initial_delay: Duration::from_millis(5),
    }
}

/// Client configuration that talks to the given proxy origin with no
/// upstream server of its own
pub fn client_config_via_proxy(origin: &str) -> Config {
    Config {
        api: ApiConfig {
            server: None,
            api_key: None,
            proxy_origin: origin.to_string(),
            ..ApiConfig::default()
        },
        polling: PollingConfig {
            reference_v2: fast_timing(),
            classic: fast_timing(),
        },
        ..Config::default()
    }
}

/// Versioned task body
pub fn v2_task(id: &str, state: &str, download_url: Option<&str>) -> Value {
    let mut body = json!({
        "id": id,
        "state": state,
        "model": "vidu2.0",
        "input": {"prompts": [{"type": "text", "content": "lanterns over a lake"}]},
        "output_params": {"duration": 4, "resolution": "720p", "aspect_ratio": "16:9"},
        "created_at": "2025-07-01T08:00:00Z"
    });
    if let Some(url) = download_url {
        body["video"] = json!({"download_url": url});
    }
    body
}
