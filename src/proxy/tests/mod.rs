use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy_config(server: Option<String>) -> ProxyConfig {
    ProxyConfig {
        server,
        api_key: Some("sk-proxy".into()),
        ..ProxyConfig::default()
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_configuration_only() {
    let router = create_router(Arc::new(ProxyConfig::default())).unwrap();
    let (status, body) = send(
        router,
        Request::get("/vidu/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "vidu");
    assert_eq!(body["status"], "unavailable");
    assert_eq!(body["config"]["has_server"], false);
    assert_eq!(body["config"]["has_pro"], false);
    assert!(body["timestamp"].as_str().is_some());

    let config = ProxyConfig {
        pro_server: Some("https://pro.vidu.com".into()),
        pro_api_key: Some("sk-pro".into()),
        ..proxy_config(Some("https://api.vidu.com".into()))
    };
    let router = create_router(Arc::new(config)).unwrap();
    let (_, body) = send(
        router,
        Request::get("/vidu/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(body["status"], "available");
    assert_eq!(body["config"]["has_key"], true);
    assert_eq!(body["config"]["has_pro"], true);
}

#[tokio::test]
async fn standard_relay_injects_key_and_keeps_path_for_custom_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vidu/ent/v2/reference2video"))
        .and(header("authorization", "Bearer sk-proxy"))
        .and(header("x-vidu-version", "2024-12-01"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"model": "vidu2.0"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p1"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let router = create_router(Arc::new(proxy_config(Some(upstream.uri())))).unwrap();
    let request = Request::post("/vidu/ent/v2/reference2video")
        .header("content-type", "application/json")
        .header("authorization", "Bearer from-browser")
        .header("x-vtoken", "browser-session")
        .body(Body::from(json!({"model": "vidu2.0"}).to_string()))
        .unwrap();

    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "p1");

    let received = upstream.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-vtoken").is_none());
}

#[tokio::test]
async fn upstream_errors_are_relayed_unchanged() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vidu/ent/v2/generations"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})),
        )
        .mount(&upstream)
        .await;

    let router = create_router(Arc::new(proxy_config(Some(upstream.uri())))).unwrap();
    let (status, body) = send(
        router,
        Request::get("/vidu/ent/v2/generations?page=2&limit=20")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], "slow down");
}

#[tokio::test]
async fn pro_relay_maps_prefix_and_prefers_pro_key() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pro/ent/v2/generations/9"))
        .and(header("authorization", "Bearer sk-pro"))
        .and(header("x-vidu-tier", "pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "9"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let config = ProxyConfig {
        pro_server: Some(upstream.uri()),
        pro_api_key: Some("sk-pro".into()),
        ..proxy_config(None)
    };
    let router = create_router(Arc::new(config)).unwrap();
    let (status, body) = send(
        router,
        Request::get("/pro/vidu/ent/v2/generations/9")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "9");
}

#[tokio::test]
async fn unreachable_upstream_yields_bad_gateway() {
    let router =
        create_router(Arc::new(proxy_config(Some("http://127.0.0.1:1".into())))).unwrap();
    let (status, body) = send(
        router,
        Request::get("/vidu/ent/v2/generations/1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_unavailable");
    assert_eq!(body["error"]["details"]["service"], "vidu");
}

#[tokio::test]
async fn access_tokens_guard_relay_but_not_health() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&upstream)
        .await;

    let config = ProxyConfig {
        access_tokens: vec!["letmein".into()],
        ..proxy_config(Some(upstream.uri()))
    };
    let router = create_router(Arc::new(config)).unwrap();

    let (status, _) = send(
        router.clone(),
        Request::get("/vidu/ent/v2/generations/1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        router.clone(),
        Request::get("/vidu/ent/v2/generations/1")
            .header("x-ptoken", "letmein")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("x-ptoken").is_none());

    let (status, _) = send(
        router,
        Request::get("/vidu/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_bodies_are_rejected_per_tier() {
    let config = ProxyConfig {
        body_limit: 16,
        pro_body_limit: 1024,
        ..proxy_config(Some("http://127.0.0.1:1".into()))
    };
    let router = create_router(Arc::new(config)).unwrap();
    let payload = "x".repeat(64);

    let (status, _) = send(
        router.clone(),
        Request::post("/vidu/v1/videos/text2video")
            .body(Body::from(payload.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    // Within the pro limit the request reaches the (unreachable) upstream
    let (status, _) = send(
        router,
        Request::post("/pro/vidu/v1/videos/text2video")
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let router = create_router(Arc::new(ProxyConfig::default())).unwrap();
    let (status, body) = send(
        router,
        Request::get("/vidu/openapi.json").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/vidu/health"].is_object());
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let router = create_router(Arc::new(ProxyConfig::default())).unwrap();
    let response = router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/vidu/ent/v2/generations/1")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn served_proxy_stops_on_shutdown_signal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve_proxy(
        listener,
        Arc::new(ProxyConfig::default()),
        async move {
            stop_rx.await.ok();
        },
    ));

    let body: Value = reqwest::get(format!("http://{address}/vidu/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["service"], "vidu");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
