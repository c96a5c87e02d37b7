//! Error types for vidu-bridge
//!
//! This module provides error handling for the library, including:
//! - The request-failure taxonomy (validation, transport, remote, decode)
//! - Storage errors raised by the key-value backends
//! - HTTP status code mapping for the relay proxy
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for vidu-bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vidu-bridge
///
/// Each variant includes enough context (URL, status, key) to diagnose a
/// failure without re-running the request.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.server")
        key: Option<String>,
    },

    /// A submission or query was rejected before any network I/O
    #[error("validation error: {0}")]
    Validation(String),

    /// The request never produced an HTTP response (unreachable host, refused
    /// connection, timeout)
    #[error("transport error calling {url}: {message}")]
    Transport {
        /// Fully resolved request URL
        url: String,
        /// Description of the transport failure
        message: String,
    },

    /// The remote service answered with a non-2xx status
    #[error("remote error ({status}): {message}")]
    Remote {
        /// HTTP status code returned by the service
        status: u16,
        /// Message extracted from `error.message`, or the bare status
        message: String,
    },

    /// A 2xx response whose body was not valid JSON
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Fully resolved request URL
        url: String,
        /// Parser error message
        message: String,
    },

    /// Key-value backend failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Serialization error (corrupt persisted collection, unencodable record)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bulk import rejected; nothing was written
    #[error("import rejected: {0}")]
    Import(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Relay proxy server error
    #[error("proxy server error: {0}")]
    ProxyServer(String),

    /// Client is shutting down and no longer starts polling sessions
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,
}

/// Errors raised by key-value storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to open or connect to the backend
    #[error("failed to open storage: {0}")]
    ConnectionFailed(String),

    /// Failed to run schema migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Read or write failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    /// HTTP status carried by a remote failure, if any
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// API error response format
///
/// Returned by the relay proxy when it cannot produce an upstream response.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "upstream_unavailable",
///     "message": "Vidu service unavailable",
///     "details": {
///       "service": "vidu"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "unauthorized", "upstream_unavailable")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    /// Create an "upstream unavailable" error tagged with the relayed service
    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::with_details(
            "upstream_unavailable",
            message,
            serde_json::json!({ "service": "vidu" }),
        )
    }
}

/// Convert errors to HTTP status codes for proxy responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,
            Error::Import(_) => 422,

            // 404 Not Found

            // Remote failures keep their own status
            Error::Remote { status, .. } => *status,

            // 502 Bad Gateway - upstream misbehaved or was unreachable
            Error::Transport { .. } => 502,
            Error::Decode { .. } => 502,

            // 500 Internal Server Error - Server-side issues
            Error::Storage(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::ProxyServer(_) => 500,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Transport { .. } => "transport_error",
            Error::Remote { .. } => "remote_error",
            Error::Decode { .. } => "decode_error",
            Error::Storage(e) => match e {
                StorageError::ConnectionFailed(_) => "storage_unavailable",
                StorageError::MigrationFailed(_) => "storage_migration_failed",
                StorageError::QueryFailed(_) => "storage_error",
            },
            Error::Sqlx(_) => "storage_error",
            Error::Serialization(_) => "serialization_error",
            Error::Import(_) => "import_rejected",
            Error::Io(_) => "io_error",
            Error::ProxyServer(_) => "proxy_server_error",
            Error::ShuttingDown => "shutting_down",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Remote { status, .. } => Some(serde_json::json!({
                "status": status,
                "service": "vidu",
            })),
            Error::Transport { url, .. } | Error::Decode { url, .. } => Some(serde_json::json!({
                "url": url,
                "service": "vidu",
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
