//! Small helpers shared by the provider adapter, the request layer and the
//! configuration code.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

/// Shorten `s` to at most `max_len` characters, ending in "..." when cut.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }

    let mut cut: String = s.chars().take(max_len - 3).collect();
    cut.push_str("...");
    cut
}

/// Credential shapes that show up in provider error bodies and saved settings
static REDACTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer [A-Za-z0-9\-_\.]+", "Bearer [REDACTED]"),
        (r"sk-[A-Za-z0-9\-_]{8,}", "sk-[REDACTED]"),
        (
            r#""((?i:[a-z]*api_?key|password|secret))"\s*:\s*"[^"]*""#,
            r#""$1": "[REDACTED]""#,
        ),
        (r"(?i)api[_-]?key[=:]\s*[A-Za-z0-9\-_]+", "api_key=[REDACTED]"),
        (r"(?i)(password|secret)[=:]\s*[^\s&]+", "$1=[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Mask API keys, bearer tokens and passwords before text reaches a log line
pub fn sanitize_for_logging(s: &str) -> String {
    REDACTIONS
        .iter()
        .fold(s.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

/// Random v4 UUID used as request id and offline operation id
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse "250ms", "30s", "5m", "1h" or a bare number of seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    let (digits, to_duration): (&str, fn(u64) -> Duration) = if let Some(v) = s.strip_suffix("ms") {
        (v, Duration::from_millis)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, Duration::from_secs)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, |n: u64| Duration::from_secs(n.saturating_mul(60)))
    } else if let Some(v) = s.strip_suffix('h') {
        (v, |n: u64| Duration::from_secs(n.saturating_mul(3600)))
    } else {
        (s.as_str(), Duration::from_secs)
    };

    digits.trim().parse::<u64>().ok().map(to_duration)
}
