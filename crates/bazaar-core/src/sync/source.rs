//! Remote snapshot sources.

use std::time::Duration;

use async_trait::async_trait;

use super::http::{build_client, ensure_success, normalize_endpoint};
use crate::error::{Error, Result};

/// One network call that returns the authoritative remote document.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Fetches the snapshot document with a GET request.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSnapshotSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSnapshotSource")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        Self::with_client(url, token, build_client(timeout)?)
    }

    /// Use an existing client, sharing its connection pool and timeout.
    pub fn with_client(
        url: impl Into<String>,
        token: Option<String>,
        client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            url: normalize_endpoint(url)?,
            token,
            client,
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<String> {
        let mut request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        tracing::debug!("Fetched snapshot from {} ({} bytes)", self.url, body.len());
        Ok(body)
    }
}

/// Stand-in used when no snapshot endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredSource;

#[async_trait]
impl SnapshotSource for UnconfiguredSource {
    async fn fetch(&self) -> Result<String> {
        Err(Error::NotConfigured(
            "no snapshot endpoint configured".to_string(),
        ))
    }
}
