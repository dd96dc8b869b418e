//! Error mapping for HTTP responses
//!
//! Converts non-2xx responses into the normalized error types of the
//! provider adapter and the request layer.

use reqwest::StatusCode;
use serde_json::Value;

use super::{ApiError, ApiErrorType, ErrorContext, ProviderError};
use crate::util::truncate_string;

/// Longest response body kept inside an error message
const MAX_ERROR_BODY: usize = 500;

/// Pull a human-readable message out of a JSON error body.
///
/// Understands the OpenAI-style `{"error": {"message": ..}}` envelope as well
/// as flat `{"message": ..}` / `{"error": ".."}` bodies.
pub fn extract_error_message(json: &Value) -> Option<String> {
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return Some(message.to_string());
        }
        if let Some(message) = error.as_str() {
            return Some(message.to_string());
        }
    }

    json.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

/// Map a completion provider response status to a `ProviderError`
pub fn map_provider_status(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| extract_error_message(&json))
        .unwrap_or_else(|| truncate_string(body, MAX_ERROR_BODY));

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Authentication(message),
        _ => ProviderError::Http {
            status: status.as_u16(),
            body: truncate_string(body, MAX_ERROR_BODY),
        },
    }
}

/// Classify an HTTP status for the request layer
pub fn classify_status(status: StatusCode) -> ApiErrorType {
    match status.as_u16() {
        500..=599 => ApiErrorType::ServerError,
        _ => ApiErrorType::UnknownError,
    }
}

/// Determine if an HTTP status code indicates a retryable error
pub fn is_retryable_status(status: StatusCode) -> bool {
    classify_status(status).is_retryable()
}

/// Map a generic API response to an `ApiError`
pub fn map_http_error(status: StatusCode, body: &str, context: ErrorContext) -> ApiError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| extract_error_message(&json))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, truncate_string(body, 100))
            }
        });

    ApiError::new(classify_status(status), message)
        .with_context(context.status_code(status.as_u16()))
}
