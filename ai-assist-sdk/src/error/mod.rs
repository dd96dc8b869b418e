//! Error handling for the AI assist SDK
//!
//! Each layer of the pipeline has its own error type:
//! - `ProviderError` for the completion provider adapter
//! - `ApiError` (classified by `ApiErrorType`) for the resilient request layer
//! - `StorageError` for the durable key-value store
//! - `ConfigError` for settings resolution
//!
//! Recovery parsing failures live next to the parser (`recovery::ParseError`)
//! because the parser reports them as values, never as propagated errors.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderKind;

pub mod mapping;

/// Result type for completion provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type for key-value store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type for configuration resolution
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised by the completion provider adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The active provider has no API key configured
    #[error("No API key configured for provider '{0}'")]
    MissingCredential(ProviderKind),

    /// The provider rejected the credential (HTTP 401)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Any other non-2xx response
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The call itself failed (connection, DNS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response without usable completion content
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The adapter could not be built from its settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// HTTP status carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Authentication(_) => Some(401),
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classification of request-layer failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorType {
    /// Connection could not be established or was dropped
    NetworkError,

    /// Request blocked by cross-origin policy
    CorsError,

    /// Request aborted after the configured timeout
    TimeoutError,

    /// 5xx response
    ServerError,

    /// Durable storage refused a write
    QuotaError,

    /// Everything else, including client 4xx responses
    UnknownError,
}

impl ApiErrorType {
    /// Only transport-level and server-side failures are worth retrying
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ApiErrorType::NetworkError | ApiErrorType::TimeoutError | ApiErrorType::ServerError
        )
    }
}

impl fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError => write!(f, "NETWORK_ERROR"),
            Self::CorsError => write!(f, "CORS_ERROR"),
            Self::TimeoutError => write!(f, "TIMEOUT_ERROR"),
            Self::ServerError => write!(f, "SERVER_ERROR"),
            Self::QuotaError => write!(f, "QUOTA_ERROR"),
            Self::UnknownError => write!(f, "UNKNOWN_ERROR"),
        }
    }
}

/// Error returned by the resilient request layer
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct ApiError {
    /// Classification driving the retry decision
    pub kind: ApiErrorType,

    /// Human-readable message
    pub message: String,

    /// Request details captured when the error was raised
    pub context: ErrorContext,
}

impl ApiError {
    /// Create an error of the given kind
    pub fn new(kind: ApiErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::TimeoutError, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::ServerError, message)
            .with_context(ErrorContext::new().status_code(status))
    }

    pub fn cors(message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::CorsError, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::QuotaError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorType::UnknownError, message)
    }

    /// Replace the error context, keeping fields the new context leaves empty
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = self.context.merge(context);
        self
    }

    /// HTTP status code if the failure came from a response
    pub fn status_code(&self) -> Option<u16> {
        self.context.status_code
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Request details attached to an `ApiError`
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Request timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// HTTP method of the failed request
    pub method: Option<String>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Request ID for tracing
    pub request_id: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            method: None,
            endpoint: None,
            status_code: None,
            request_id: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
        self
    }

    fn merge(mut self, other: ErrorContext) -> Self {
        self.timestamp = other.timestamp;
        self.method = other.method.or(self.method);
        self.endpoint = other.endpoint.or(self.endpoint);
        self.status_code = other.status_code.or(self.status_code);
        self.request_id = other.request_id.or(self.request_id);
        self.data.extend(other.data);
        self
    }
}

/// Errors raised by the durable key-value store
#[derive(Error, Debug)]
pub enum StorageError {
    /// The write would exceed the store's capacity
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Underlying file system failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key cannot be mapped onto the backing store
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded(_))
    }
}

/// Errors raised while resolving settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    Missing(String),

    #[error("Invalid value for key {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Failed to read persisted settings: {0}")]
    Storage(#[from] StorageError),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl fmt::Display) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Classify reqwest transport errors for the request layer
impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let text = err.to_string();

        let api_error = if err.is_timeout() {
            ApiError::timeout(format!("Request timed out: {}", text))
        } else if text.to_lowercase().contains("cors") {
            ApiError::cors(format!("Request blocked by CORS policy: {}", text))
        } else if err.is_connect() || err.is_request() {
            ApiError::network(format!("Connection error: {}", text))
        } else if err.is_redirect() {
            ApiError::network(format!("Too many redirects: {}", text))
        } else if err.is_decode() || err.is_body() {
            ApiError::unknown(format!("Response decode error: {}", text))
        } else {
            ApiError::unknown(format!("HTTP client error: {}", text))
        };

        match err.status() {
            Some(status) => api_error.with_context(ErrorContext::new().status_code(status.as_u16())),
            None => api_error,
        }
    }
}

/// Storage failures surface as quota errors when the store is full
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if err.is_quota() {
            ApiError::quota(err.to_string())
        } else {
            ApiError::unknown(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::network("down").is_retryable());
        assert!(ApiError::timeout("slow").is_retryable());
        assert!(ApiError::server(503, "unavailable").is_retryable());
        assert!(!ApiError::cors("blocked").is_retryable());
        assert!(!ApiError::quota("full").is_retryable());
        assert!(!ApiError::unknown("bad request").is_retryable());
    }

    #[test]
    fn test_context_merge_keeps_existing_fields() {
        let err = ApiError::server(502, "bad gateway")
            .with_context(ErrorContext::new().endpoint("/projects").method("POST"));

        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.context.endpoint.as_deref(), Some("/projects"));
        assert_eq!(err.context.method.as_deref(), Some("POST"));
        assert_eq!(err.to_string(), "SERVER_ERROR: bad gateway");
    }

    #[test]
    fn test_storage_error_conversion() {
        let quota: ApiError = StorageError::QuotaExceeded("offline_queue".into()).into();
        assert_eq!(quota.kind, ApiErrorType::QuotaError);

        let other: ApiError = StorageError::InvalidKey("../x".into()).into();
        assert_eq!(other.kind, ApiErrorType::UnknownError);
    }

    #[test]
    fn test_provider_error_status() {
        assert_eq!(ProviderError::Authentication("bad key".into()).status_code(), Some(401));
        assert_eq!(
            ProviderError::Http { status: 429, body: "slow down".into() }.status_code(),
            Some(429)
        );
        assert_eq!(ProviderError::Network("reset".into()).status_code(), None);
    }
}
