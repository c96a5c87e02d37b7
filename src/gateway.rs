//! Request gateway: URL resolution, header assembly and response normalization
//!
//! Every call to the service goes through [`RequestGateway::call`]. It issues
//! exactly one HTTP request; retrying is left to callers.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthResolver;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::Event;

/// Path segment marking the alternate (pro) tier
const PRO_SEGMENT: &str = "pro";
/// Service namespace inserted between base URL and path
const SERVICE_NAMESPACE: &str = "/vidu";

/// Body of an outgoing request
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body; the request defaults to GET
    #[default]
    Empty,
    /// JSON body; the request defaults to POST with a JSON content type
    Json(Value),
    /// File upload; the request defaults to POST and the transport sets the
    /// multipart boundary header
    Multipart(reqwest::multipart::Form),
}

/// One call through the gateway
#[derive(Debug, Default)]
pub struct ApiRequest {
    /// Service path (`/ent/v2/generations/1`) or absolute URL
    pub path: String,
    /// Request body
    pub body: RequestBody,
    /// Explicit method, taking precedence over the body-derived default
    pub method: Option<Method>,
    /// Replaces the default header set; auth headers are still applied on top
    pub headers: Option<BTreeMap<String, String>>,
}

impl ApiRequest {
    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// POST with a JSON body
    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            body: RequestBody::Json(serde_json::to_value(body)?),
            ..Self::default()
        })
    }

    /// POST with a multipart body
    pub fn multipart(path: impl Into<String>, form: reqwest::multipart::Form) -> Self {
        Self {
            path: path.into(),
            body: RequestBody::Multipart(form),
            ..Self::default()
        }
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::get(path).with_method(Method::DELETE)
    }

    /// Override the method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Replace the default header set
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Resolve a service path against the configured base
///
/// Absolute `http(s)` URLs pass through. Otherwise every `pro` path segment is
/// removed and, if any was present, re-inserted right after the base unless the
/// base already targets the pro tier. `/vidu` always precedes the path. Without
/// a base server the proxy origin is used.
pub fn resolve_url(server: Option<&str>, proxy_origin: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    let (path_part, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    let mut had_pro = false;
    let segments: Vec<&str> = path_part
        .split('/')
        .filter(|s| !s.is_empty())
        .filter(|s| {
            if *s == PRO_SEGMENT {
                had_pro = true;
                false
            } else {
                true
            }
        })
        .collect();

    let mut rest = String::new();
    for segment in segments {
        rest.push('/');
        rest.push_str(segment);
    }
    if let Some(q) = query {
        rest.push('?');
        rest.push_str(q);
    }

    let server = server.map(str::trim).filter(|s| !s.is_empty());
    let base = server.unwrap_or(proxy_origin).trim_end_matches('/');
    let tier = if had_pro && !(server.is_some() && base_is_pro(base)) {
        "/pro"
    } else {
        ""
    };

    format!("{base}{tier}{SERVICE_NAMESPACE}{rest}")
}

/// Whether a base URL already encodes the pro tier (a `pro` path segment or a
/// `pro.` host)
pub fn base_is_pro(base: &str) -> bool {
    match url::Url::parse(base) {
        Ok(parsed) => {
            let host_is_pro = parsed
                .host_str()
                .is_some_and(|h| h.starts_with("pro."));
            let path_is_pro = parsed
                .path_segments()
                .is_some_and(|mut segs| segs.any(|s| s == PRO_SEGMENT));
            host_is_pro || path_is_pro
        }
        Err(_) => base.split('/').any(|s| s == PRO_SEGMENT),
    }
}

/// Issues authenticated calls and normalizes the outcome
#[derive(Clone)]
pub struct RequestGateway {
    http: reqwest::Client,
    server: Option<String>,
    proxy_origin: String,
    auth: AuthResolver,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl RequestGateway {
    /// Create a gateway for the given API configuration
    pub fn new(
        config: &ApiConfig,
        auth: AuthResolver,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {e}"),
                key: Some("api".to_string()),
            })?;

        Ok(Self {
            http,
            server: config.server.clone(),
            proxy_origin: config.proxy_origin.clone(),
            auth,
            event_tx,
        })
    }

    /// Auth resolver consulted on every call
    pub fn auth(&self) -> &AuthResolver {
        &self.auth
    }

    /// Fully resolved URL for a service path
    pub fn url_for(&self, path: &str) -> String {
        resolve_url(self.server.as_deref(), &self.proxy_origin, path)
    }

    /// GET a service path
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.call(ApiRequest::get(path)).await
    }

    /// POST a JSON body
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        self.call(ApiRequest::post_json(path, body)?).await
    }

    /// POST a multipart form
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value> {
        self.call(ApiRequest::multipart(path, form)).await
    }

    /// DELETE a service path
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.call(ApiRequest::delete(path)).await
    }

    /// Issue one request and return the decoded JSON body
    ///
    /// An empty 2xx body decodes as `Value::Null`. Transport, non-2xx and
    /// decode failures are reported as [`Event::RequestFailed`] before being
    /// returned.
    pub async fn call(&self, request: ApiRequest) -> Result<Value> {
        let url = self.url_for(&request.path);
        let ApiRequest {
            body,
            method,
            headers,
            ..
        } = request;

        let mut header_set: BTreeMap<String, String> = BTreeMap::new();
        if !matches!(body, RequestBody::Multipart(_)) {
            header_set.insert("content-type".to_string(), "application/json".to_string());
        }
        if let Some(custom) = headers {
            header_set = custom
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect();
        }
        header_set.extend(self.auth.resolve());

        let method = method.unwrap_or(match body {
            RequestBody::Empty => Method::GET,
            RequestBody::Json(_) | RequestBody::Multipart(_) => Method::POST,
        });

        debug!(method = %method, url = %url, "calling vidu");

        let mut builder = self.http.request(method, &url);
        for (name, value) in &header_set {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
            RequestBody::Multipart(form) => builder.multipart(form),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(self.report(Error::Transport {
                    url,
                    message: describe_transport_error(&e),
                }));
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(self.report(Error::Transport {
                    url,
                    message: describe_transport_error(&e),
                }));
            }
        };

        if !status.is_success() {
            let message = extract_error_message(&bytes).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(self.report_at(
                &url,
                Error::Remote {
                    status: status.as_u16(),
                    message,
                },
            ));
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            self.report(Error::Decode {
                url: url.clone(),
                message: e.to_string(),
            })
        })
    }

    fn report(&self, error: Error) -> Error {
        let url = match &error {
            Error::Transport { url, .. } | Error::Decode { url, .. } => url.clone(),
            _ => String::new(),
        };
        self.report_at(&url, error)
    }

    fn report_at(&self, url: &str, error: Error) -> Error {
        warn!(url = %url, error = %error, "vidu request failed");
        self.event_tx
            .send(Event::RequestFailed {
                url: url.to_string(),
                status: error.remote_status(),
                message: error.to_string(),
            })
            .ok();
        error
    }
}

/// `error.message` (or a top-level `message`) from an error body
fn extract_error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("service unreachable: {e}")
    } else {
        e.to_string()
    }
}
