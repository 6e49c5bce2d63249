//! Pure helpers: URL building, error body and header parsing (no HTTP, no status logic).

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Join the base URL and an endpoint path, returning the full URL and the
/// path component the signature covers.
pub(crate) fn endpoint_url(base_url: &str, endpoint: &str) -> ClientResult<(String, String)> {
    let full = format!("{}{}", base_url.trim_end_matches('/'), endpoint);
    let parsed = url::Url::parse(&full).map_err(|_| ClientError::NotConfigured {
        missing: "valid base_url",
    })?;
    let path = parsed.path().to_string();
    Ok((full, path))
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"message": "..."}` or `{"error": "..."}`; falls back to the
/// first 200 characters of a non-JSON body.
pub(crate) fn parse_error_message(body: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        return json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .map(String::from);
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(200).collect())
    }
}

/// `Retry-After` in delta-seconds form.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
