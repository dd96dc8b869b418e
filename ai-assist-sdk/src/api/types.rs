//! Request and response types of the request layer

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Writes are queued while offline, reads are not
    pub fn is_mutating(self) -> bool {
        !matches!(self, HttpMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request options; persisted verbatim with queued operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    pub method: HttpMethod,

    /// Extra headers on top of the client defaults
    pub headers: BTreeMap<String, String>,

    /// JSON body, ignored for GET
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Overrides the client timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Overrides the client retry count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl RequestOptions {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Outcome of a request-layer call
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// Decoded body of a successful response; `None` for empty bodies
    pub data: Option<T>,

    pub error: Option<ApiError>,

    /// HTTP status of the final response, if one was received
    pub status: Option<u16>,

    /// The write was stored in the offline queue for later replay
    pub queued: bool,
}

impl<T> ApiResponse<T> {
    pub(crate) fn success(status: u16, data: Option<T>) -> Self {
        Self {
            data,
            error: None,
            status: Some(status),
            queued: false,
        }
    }

    pub(crate) fn failure(error: ApiError) -> Self {
        Self {
            data: None,
            status: error.status_code(),
            error: Some(error),
            queued: false,
        }
    }

    pub(crate) fn queued() -> Self {
        Self {
            data: None,
            error: None,
            status: None,
            queued: true,
        }
    }

    /// Received a 2xx response
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.queued
    }

    /// Convert into a `Result`, treating a queued write as success without data
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_classification() {
        assert!(!HttpMethod::Get.is_mutating());
        assert!(HttpMethod::Post.is_mutating());
        assert!(HttpMethod::Delete.is_mutating());
        assert_eq!(reqwest::Method::from(HttpMethod::Patch), reqwest::Method::PATCH);
    }

    #[test]
    fn test_options_serialization() {
        let options = RequestOptions::new(HttpMethod::Post)
            .with_header("X-Project", "42")
            .with_body(json!({"name": "Pricing"}));

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({"method": "POST", "headers": {"X-Project": "42"}, "body": {"name": "Pricing"}})
        );

        let parsed: RequestOptions = serde_json::from_value(json!({"method": "DELETE"})).unwrap();
        assert_eq!(parsed, RequestOptions::new(HttpMethod::Delete));
    }

    #[test]
    fn test_response_states() {
        let ok = ApiResponse::success(200, Some(1));
        assert!(ok.is_success());

        let queued = ApiResponse::<i32>::queued();
        assert!(!queued.is_success());
        assert!(queued.into_result().unwrap().is_none());

        let failed = ApiResponse::<i32>::failure(ApiError::server(503, "down"));
        assert_eq!(failed.status, Some(503));
        assert!(failed.into_result().is_err());
    }
}
