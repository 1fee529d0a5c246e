//! HTTP header and SSE helpers.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::ColloquyError;

/// JSON headers, plus a bearer token when the server wants one.
pub fn json_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// What one SSE line means for a chat completion stream.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine<'a> {
    Data(&'a str),
    Done,
    Ignore,
}

/// Classify one SSE line. Comments, blank lines and non-data fields are ignored.
pub fn parse_sse_line(line: &str) -> SseLine<'_> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Ignore;
    };
    match data.trim_start() {
        "" => SseLine::Ignore,
        "[DONE]" => SseLine::Done,
        payload => SseLine::Data(payload),
    }
}

/// Turn a non-success status and body into an error, preferring the
/// server's own `error.message`.
pub fn status_to_error(status: u16, body: &str) -> ColloquyError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string());
    ColloquyError::api(status, message)
}
