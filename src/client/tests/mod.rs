use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

use crate::client::ViduClient;
use crate::config::{ApiConfig, Config, PollTiming, PollingConfig};
use crate::storage::MemoryKv;


/// Replies with each template in turn, repeating the last one
struct Sequence {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Sequence {
    fn json(bodies: Vec<Value>) -> Self {
        Self {
            responses: bodies
                .into_iter()
                .map(|b| ResponseTemplate::new(200).set_body_json(b))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len() - 1);
        self.responses[index].clone()
    }
}

fn fast(max_attempts: u32) -> PollTiming {
    PollTiming {
        max_attempts,
        interval: Duration::from_millis(1),
        initial_delay: Duration::ZERO,
    }
}

fn slow(max_attempts: u32) -> PollTiming {
    PollTiming {
        max_attempts,
        interval: Duration::from_millis(50),
        initial_delay: Duration::ZERO,
    }
}

fn client_with(server: &MockServer, timing: PollTiming) -> ViduClient {
    let config = Config {
        api: ApiConfig {
            server: Some(server.uri()),
            api_key: Some("sk-test".into()),
            ..ApiConfig::default()
        },
        polling: PollingConfig {
            reference_v2: timing,
            classic: timing,
        },
        ..Config::default()
    };
    ViduClient::new(config, Arc::new(MemoryKv::new())).unwrap()
}

fn client_for(server: &MockServer) -> ViduClient {
    client_with(server, fast(10))
}

fn v2(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "type": "reference2video",
        "state": state,
        "model": "vidu2.0",
        "input": {"prompts": [{"type": "text", "content": "a fox in snow", "negative": false}]},
        "output_params": {"duration": 4, "resolution": "720p"},
        "created_at": "2025-06-01T12:00:00Z"
    })
}

fn v2_done(id: &str) -> Value {
    let mut body = v2(id, "completed");
    body["video"] = json!({"download_url": format!("https://cdn.example.com/{id}.mp4")});
    body
}
