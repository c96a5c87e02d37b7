//! Configuration types for vidu-bridge

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for [`ViduClient`](crate::ViduClient)
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) - upstream server, service key and request timeout
/// - [`polling`](PollingConfig) - the two named polling timings
/// - [`store`](StoreConfig) - persisted keys, retention and ordering
/// - [`persistence`](PersistenceConfig) - key-value backend selection
/// - [`defaults`](GenerationDefaults) - parameters applied to omitted submission fields
/// - [`proxy`](ProxyConfig) - the credential-hiding relay server
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API access
    #[serde(default)]
    pub api: ApiConfig,

    /// Polling cadence and attempt budgets
    #[serde(default)]
    pub polling: PollingConfig,

    /// Task store behavior
    #[serde(default)]
    pub store: StoreConfig,

    /// Key-value backend
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Defaults for optional generation parameters
    #[serde(default)]
    pub defaults: GenerationDefaults,

    /// Relay proxy server
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Config {
    /// Check that configured URLs parse and numeric limits are usable
    pub fn validate(&self) -> Result<()> {
        if let Some(server) = &self.api.server {
            check_url(server, "api.server")?;
        }
        check_url(&self.api.proxy_origin, "api.proxy_origin")?;
        if let Some(server) = &self.proxy.server {
            check_url(server, "proxy.server")?;
        }
        if let Some(server) = &self.proxy.pro_server {
            check_url(server, "proxy.pro_server")?;
        }
        check_url(&self.proxy.fallback_base_url, "proxy.fallback_base_url")?;

        for (name, timing) in [
            ("polling.reference_v2", &self.polling.reference_v2),
            ("polling.classic", &self.polling.classic),
        ] {
            if timing.max_attempts == 0 {
                return Err(Error::Config {
                    message: "max_attempts must be at least 1".to_string(),
                    key: Some(format!("{name}.max_attempts")),
                });
            }
        }

        if self.store.retention_cap == Some(0) {
            return Err(Error::Config {
                message: "retention_cap must be at least 1 (use null to disable trimming)"
                    .to_string(),
                key: Some("store.retention_cap".to_string()),
            });
        }

        Ok(())
    }
}

fn check_url(value: &str, key: &str) -> Result<()> {
    let parsed = url::Url::parse(value).map_err(|e| Error::Config {
        message: format!("invalid URL '{value}': {e}"),
        key: Some(key.to_string()),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config {
            message: format!("unsupported URL scheme '{other}' in '{value}'"),
            key: Some(key.to_string()),
        }),
    }
}

/// Upstream API access configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base server URL (VIDU_SERVER). When unset, requests go through `proxy_origin`.
    #[serde(default)]
    pub server: Option<String>,

    /// Service-level API key (VIDU_KEY). When unset, the session token is sent as `x-ptoken`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Origin of the relay proxy used when no server is configured
    /// (default: "http://127.0.0.1:6790")
    #[serde(default = "default_proxy_origin")]
    pub proxy_origin: String,

    /// Per-request timeout in seconds (default: 60)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server: None,
            api_key: None,
            proxy_origin: default_proxy_origin(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Cadence of one polling flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTiming {
    /// Maximum number of status fetches per session
    pub max_attempts: u32,

    /// Sleep between fetches, in milliseconds
    #[serde(with = "millis_serde")]
    pub interval: Duration,

    /// Delay before the first fetch, in milliseconds
    #[serde(default, with = "millis_serde")]
    pub initial_delay: Duration,
}

impl PollTiming {
    /// Timing used by the versioned reference-to-video flow: 120 attempts, 5 s apart,
    /// first fetch after 1 s
    pub fn reference_v2() -> Self {
        Self {
            max_attempts: 120,
            interval: Duration::from_millis(5000),
            initial_delay: Duration::from_millis(1000),
        }
    }

    /// Timing used by the classic text/image-to-video flow: 200 attempts, 5.2 s apart
    pub fn classic() -> Self {
        Self {
            max_attempts: 200,
            interval: Duration::from_millis(5200),
            initial_delay: Duration::ZERO,
        }
    }
}

/// Polling configuration for both flows
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Reference-to-video flow (`/ent/v2/generations/{id}`)
    #[serde(default = "PollTiming::reference_v2")]
    pub reference_v2: PollTiming,

    /// Classic flow (`/v1/videos/{category}/{id}`)
    #[serde(default = "PollTiming::classic")]
    pub classic: PollTiming,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            reference_v2: PollTiming::reference_v2(),
            classic: PollTiming::classic(),
        }
    }
}

/// Read ordering exposed by `TaskStore::all`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Most recently inserted first (the order records are stored in)
    #[default]
    Insertion,
    /// Newest `created_at` first
    CreatedDesc,
}

/// Task store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key holding the task collection (default: "vidu-tasks")
    #[serde(default = "default_tasks_key")]
    pub tasks_key: String,

    /// Key holding the preference object (default: "vidu-preferences")
    #[serde(default = "default_preferences_key")]
    pub preferences_key: String,

    /// Records kept after every insert (default: 200, None = never trim automatically)
    #[serde(default = "default_retention_cap")]
    pub retention_cap: Option<usize>,

    /// Ordering of `TaskStore::all`
    #[serde(default)]
    pub sort: SortPolicy,

    /// Default cap for explicit `TaskStore::retention_trim` calls (default: 50)
    #[serde(default = "default_cleanup_keep")]
    pub cleanup_keep: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tasks_key: default_tasks_key(),
            preferences_key: default_preferences_key(),
            retention_cap: default_retention_cap(),
            sort: SortPolicy::default(),
            cleanup_keep: default_cleanup_keep(),
        }
    }
}

/// Key-value backend selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local map, lost on exit
    #[default]
    Memory,
    /// SQLite file holding a `kv_store` table
    Sqlite {
        /// Database path
        path: PathBuf,
    },
}

/// Data storage configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend used by the task and preference stores
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Defaults for generation parameters the caller leaves out
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    /// Clip length in seconds (default: 4)
    #[serde(default = "default_duration")]
    pub duration: u32,

    /// Random seed (default: "0")
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Aspect ratio (default: "16:9")
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// Output resolution (default: "720p")
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Camera movement amplitude (default: "auto")
    #[serde(default = "default_movement_amplitude")]
    pub movement_amplitude: String,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            seed: default_seed(),
            aspect_ratio: default_aspect_ratio(),
            resolution: default_resolution(),
            movement_amplitude: default_movement_amplitude(),
        }
    }
}

/// Relay proxy configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_proxy_bind")]
    pub bind_address: SocketAddr,

    /// Standard upstream (VIDU_SERVER)
    #[serde(default)]
    pub server: Option<String>,

    /// Standard service key (VIDU_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upstream used when no server is configured (OPENAI_API_BASE_URL,
    /// default: "https://api.openai.com")
    #[serde(default = "default_fallback_base_url")]
    pub fallback_base_url: String,

    /// Key used when no service key is configured (OPENAI_API_KEY)
    #[serde(default)]
    pub fallback_api_key: Option<String>,

    /// Pro-tier upstream (VIDU_PRO_SERVER)
    #[serde(default)]
    pub pro_server: Option<String>,

    /// Pro-tier key (VIDU_PRO_KEY)
    #[serde(default)]
    pub pro_api_key: Option<String>,

    /// Maximum request body for the standard tier in bytes (default: 10 MiB)
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    /// Maximum request body for the pro tier in bytes (default: 20 MiB)
    #[serde(default = "default_pro_body_limit")]
    pub pro_body_limit: usize,

    /// Upstream request timeout in seconds (default: 30)
    #[serde(default = "default_upstream_timeout", with = "duration_serde")]
    pub upstream_timeout: Duration,

    /// Value of the `X-Vidu-Version` header (default: "2024-12-01")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Accepted `x-ptoken` values; empty disables the access check
    #[serde(default)]
    pub access_tokens: Vec<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: default_proxy_bind(),
            server: None,
            api_key: None,
            fallback_base_url: default_fallback_base_url(),
            fallback_api_key: None,
            pro_server: None,
            pro_api_key: None,
            body_limit: default_body_limit(),
            pro_body_limit: default_pro_body_limit(),
            upstream_timeout: default_upstream_timeout(),
            api_version: default_api_version(),
            access_tokens: Vec::new(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ProxyConfig {
    /// Build a proxy configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a proxy configuration from an arbitrary variable source
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self {
            server: get("VIDU_SERVER"),
            api_key: get("VIDU_KEY"),
            fallback_api_key: get("OPENAI_API_KEY"),
            pro_server: get("VIDU_PRO_SERVER"),
            pro_api_key: get("VIDU_PRO_KEY"),
            ..Self::default()
        };

        if let Some(base) = get("OPENAI_API_BASE_URL") {
            config.fallback_base_url = base;
        }

        if let Some(bind) = get("VIDU_PROXY_BIND") {
            config.bind_address = bind.parse().map_err(|e| Error::Config {
                message: format!("invalid bind address '{bind}': {e}"),
                key: Some("VIDU_PROXY_BIND".to_string()),
            })?;
        }

        if let Some(tokens) = get("VIDU_PROXY_TOKENS") {
            config.access_tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    /// Upstream for the standard tier
    pub fn standard_upstream(&self) -> &str {
        self.server.as_deref().unwrap_or(&self.fallback_base_url)
    }

    /// Bearer key for the standard tier
    pub fn standard_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .or(self.fallback_api_key.as_deref())
    }

    /// Upstream for the pro tier
    pub fn pro_upstream(&self) -> &str {
        self.pro_server
            .as_deref()
            .or(self.server.as_deref())
            .unwrap_or(&self.fallback_base_url)
    }

    /// Bearer key for the pro tier
    pub fn pro_key(&self) -> Option<&str> {
        self.pro_api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .or(self.fallback_api_key.as_deref())
    }

    /// Whether a dedicated pro tier (server and key) is configured
    pub fn has_pro(&self) -> bool {
        self.pro_server.is_some() && self.pro_api_key.is_some()
    }
}

// Default value functions
fn default_proxy_origin() -> String {
    "http://127.0.0.1:6790".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tasks_key() -> String {
    "vidu-tasks".into()
}

fn default_preferences_key() -> String {
    "vidu-preferences".into()
}

fn default_retention_cap() -> Option<usize> {
    Some(200)
}

fn default_cleanup_keep() -> usize {
    50
}

fn default_duration() -> u32 {
    4
}

fn default_seed() -> String {
    "0".into()
}

fn default_aspect_ratio() -> String {
    "16:9".into()
}

fn default_resolution() -> String {
    "720p".into()
}

fn default_movement_amplitude() -> String {
    "auto".into()
}

fn default_proxy_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_fallback_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

fn default_pro_body_limit() -> usize {
    20 * 1024 * 1024
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_api_version() -> String {
    "2024-12-01".into()
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_reproduce_reference_constants() {
        let config = Config::default();

        assert_eq!(config.polling.reference_v2.max_attempts, 120);
        assert_eq!(
            config.polling.reference_v2.interval,
            Duration::from_millis(5000)
        );
        assert_eq!(
            config.polling.reference_v2.initial_delay,
            Duration::from_millis(1000)
        );
        assert_eq!(config.polling.classic.max_attempts, 200);
        assert_eq!(config.polling.classic.interval, Duration::from_millis(5200));
        assert_eq!(config.polling.classic.initial_delay, Duration::ZERO);

        assert_eq!(config.store.tasks_key, "vidu-tasks");
        assert_eq!(config.store.retention_cap, Some(200));
        assert_eq!(config.store.cleanup_keep, 50);
        assert_eq!(config.store.sort, SortPolicy::Insertion);

        assert_eq!(config.defaults.duration, 4);
        assert_eq!(config.defaults.seed, "0");
        assert_eq!(config.defaults.aspect_ratio, "16:9");
        assert_eq!(config.defaults.resolution, "720p");
        assert_eq!(config.defaults.movement_amplitude, "auto");

        assert_eq!(config.proxy.body_limit, 10 * 1024 * 1024);
        assert_eq!(config.proxy.pro_body_limit, 20 * 1024 * 1024);
        assert_eq!(config.proxy.api_version, "2024-12-01");
        assert_eq!(config.persistence.backend, StorageBackend::Memory);
    }

    #[test]
    fn empty_json_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.api.proxy_origin, "http://127.0.0.1:6790");
        assert_eq!(config.api.request_timeout, Duration::from_secs(60));
        config.validate().unwrap();
    }

    #[test]
    fn poll_timing_serializes_as_milliseconds() {
        let json = serde_json::to_value(PollTiming::classic()).unwrap();
        assert_eq!(json["interval"], 5200);
        assert_eq!(json["initial_delay"], 0);
        assert_eq!(json["max_attempts"], 200);

        let parsed: PollTiming =
            serde_json::from_str(r#"{"max_attempts": 3, "interval": 10}"#).unwrap();
        assert_eq!(parsed.interval, Duration::from_millis(10));
        assert_eq!(parsed.initial_delay, Duration::ZERO);
    }

    #[test]
    fn sqlite_backend_is_tagged() {
        let json = r#"{"backend": {"type": "sqlite", "path": "/tmp/vidu.db"}}"#;
        let persistence: PersistenceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            persistence.backend,
            StorageBackend::Sqlite {
                path: PathBuf::from("/tmp/vidu.db")
            }
        );
    }

    #[test]
    fn validate_rejects_malformed_server_url() {
        let mut config = Config::default();
        config.api.server = Some("not a url".into());

        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("api.server")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_attempt_budget() {
        let mut config = Config::default();
        config.polling.classic.max_attempts = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("polling.classic.max_attempts"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let mut config = Config::default();
        config.proxy.pro_server = Some("ftp://files.example.com".into());
        assert!(config.validate().is_err());
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn proxy_from_lookup_reads_all_variables() {
        let vars = env(&[
            ("VIDU_SERVER", "https://api.vidu.com/vidu"),
            ("VIDU_KEY", "std-key"),
            ("VIDU_PRO_SERVER", "https://pro.vidu.com/pro/vidu"),
            ("VIDU_PRO_KEY", "pro-key"),
            ("OPENAI_API_BASE_URL", "https://relay.example.com"),
            ("OPENAI_API_KEY", "fallback-key"),
            ("VIDU_PROXY_BIND", "0.0.0.0:7000"),
            ("VIDU_PROXY_TOKENS", "a, b,,c"),
        ]);
        let config = ProxyConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.standard_upstream(), "https://api.vidu.com/vidu");
        assert_eq!(config.standard_key(), Some("std-key"));
        assert_eq!(config.pro_upstream(), "https://pro.vidu.com/pro/vidu");
        assert_eq!(config.pro_key(), Some("pro-key"));
        assert_eq!(config.fallback_base_url, "https://relay.example.com");
        assert_eq!(config.bind_address, "0.0.0.0:7000".parse().unwrap());
        assert_eq!(config.access_tokens, vec!["a", "b", "c"]);
        assert!(config.has_pro());
    }

    #[test]
    fn proxy_keys_fall_back_in_order() {
        let vars = env(&[("OPENAI_API_KEY", "fallback-key"), ("VIDU_KEY", "")]);
        let config = ProxyConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.standard_upstream(), "https://api.openai.com");
        assert_eq!(config.standard_key(), Some("fallback-key"));
        assert_eq!(config.pro_upstream(), "https://api.openai.com");
        assert_eq!(config.pro_key(), Some("fallback-key"));
        assert!(!config.has_pro());
    }

    #[test]
    fn proxy_from_lookup_rejects_bad_bind_address() {
        let vars = env(&[("VIDU_PROXY_BIND", "localhost")]);
        let err = ProxyConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
