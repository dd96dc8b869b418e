//! Request layer configuration and builder

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use url::Url;

use crate::config::{ConfigProvider, ConfigProviderExt};
use crate::error::{ApiError, ConfigError, ConfigResult};
use crate::services::UserAgent;
use crate::storage::{KeyValueStore, MemoryStore};

use super::connectivity::ConnectivityMonitor;
use super::retry::RetryPolicy;
use super::ApiClient;

/// Resolved configuration of an `ApiClient`
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Prefix for relative endpoints
    pub base_url: String,

    /// Timeout per attempt
    pub timeout: Duration,

    /// Retry and backoff policy for retryable failures
    pub retry: RetryPolicy,

    /// Headers sent with every request
    pub headers: HashMap<String, String>,

    pub user_agent: UserAgent,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            headers: HashMap::new(),
            user_agent: UserAgent::component("api-client"),
        }
    }
}

impl ApiClientConfig {
    /// Read `api_base_url`, `api_timeout` and `api_retries`
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let defaults = Self::default();

        let timeout = match provider.get_duration("api_timeout") {
            Ok(timeout) => timeout,
            Err(ConfigError::Missing(_)) => defaults.timeout,
            Err(e) => return Err(e),
        };
        let retries = provider.get_parsed_or("api_retries", defaults.retry.retries)?;

        Ok(Self {
            base_url: provider.get_string("api_base_url")?,
            timeout,
            retry: defaults.retry.with_retries(retries),
            ..defaults
        })
    }

    pub(crate) fn build_http_client(&self) -> Result<Client, ApiError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_str(key)
                .map_err(|e| ApiError::unknown(format!("Invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::unknown(format!("Invalid header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        Client::builder()
            .user_agent(self.user_agent.to_string())
            .default_headers(headers)
            .timeout(self.timeout)
            .gzip(true)
            .build()
            .map_err(|e| ApiError::unknown(format!("Failed to build HTTP client: {}", e)))
    }
}

/// Builder for `ApiClient`
pub struct ApiClientBuilder {
    config: ApiClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    monitor: Option<ConnectivityMonitor>,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ApiClientConfig {
            base_url: base_url.into(),
            ..ApiClientConfig::default()
        })
    }

    pub fn from_config(config: ApiClientConfig) -> Self {
        Self {
            config,
            store: None,
            monitor: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Retries after the first attempt
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retry.retries = retries;
        self
    }

    /// Delay before the first retry and the cap on any delay
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry.base_delay = base;
        self.config.retry.max_delay = max;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.config.user_agent = user_agent;
        self
    }

    /// Durable store for the offline queue; defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share connectivity state with other components; defaults to online
    pub fn monitor(mut self, monitor: ConnectivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        Url::parse(&self.config.base_url).map_err(|e| {
            ApiError::unknown(format!("Invalid base URL '{}': {}", self.config.base_url, e))
        })?;

        let http_client = self.config.build_http_client()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let monitor = self.monitor.unwrap_or_default();

        Ok(ApiClient::from_parts(self.config, http_client, store, monitor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigProvider;

    #[test]
    fn test_config_from_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("api_base_url", "http://localhost:8080/api");
        provider.set("api_timeout", "5s");
        provider.set("api_retries", "1");

        let config = ApiClientConfig::from_provider(&provider).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.retries, 1);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_base_url_is_required() {
        let provider = MemoryConfigProvider::new();
        assert!(matches!(
            ApiClientConfig::from_provider(&provider),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let result = ApiClientBuilder::new("http://localhost")
            .header("bad header", "x")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        let err = ApiClientBuilder::new("/api").build().err().unwrap();
        assert!(err.message.starts_with("Invalid base URL '/api'"));
    }
}
