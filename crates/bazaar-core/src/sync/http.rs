//! HTTP plumbing shared by the snapshot source and mutation sinks.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Build a client whose requests give up after `timeout`.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| Error::NotConfigured(format!("failed to build HTTP client: {error}")))
}

/// Trim an endpoint, require an http(s) scheme and drop trailing slashes.
pub(crate) fn normalize_endpoint(raw: impl Into<String>) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw.into()))
        .ok_or_else(|| Error::NotConfigured("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::NotConfigured(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Turn a non-success response into a readable message.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Map a completed response to `RemoteRejected` unless it succeeded.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteRejected(parse_api_error(status, &body)))
}
