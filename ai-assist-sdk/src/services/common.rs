//! Common utilities for HTTP clients
//!
//! Shared by the completion provider adapter and the resilient request layer.

use std::fmt;
use std::time::Duration;

use reqwest::{header, Client};

/// Default timeout when a caller does not supply one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    /// Application name
    pub app_name: String,

    /// Version string
    pub version: String,

    /// Optional extra info
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "Labeling-Workbench".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("ai-assist-sdk".to_string()),
        }
    }
}

impl UserAgent {
    /// Default user agent with a different extra component
    pub fn component(extra: impl Into<String>) -> Self {
        Self {
            extra: Some(extra.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;

        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }

        Ok(())
    }
}

/// Build a standard HTTP client with default settings.
///
/// The error is a plain message; each layer wraps it in its own error type.
pub fn build_http_client(
    user_agent: Option<UserAgent>,
    timeout: Option<Duration>,
) -> std::result::Result<Client, String> {
    let mut headers = header::HeaderMap::new();
    let ua = user_agent.unwrap_or_default().to_string();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&ua).map_err(|e| format!("Invalid user agent: {}", e))?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
        .gzip(true)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_display() {
        let ua = UserAgent {
            app_name: "App".into(),
            version: "1.2.3".into(),
            extra: Some("client".into()),
        };
        assert_eq!(ua.to_string(), "App/1.2.3 (client)");
        assert!(UserAgent::component("api").to_string().ends_with("(api)"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://x.io/v1/", "/chat/completions"), "https://x.io/v1/chat/completions");
        assert_eq!(join_url("http://h", "items"), "http://h/items");
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(None, Some(Duration::from_secs(5))).is_ok());
    }
}
