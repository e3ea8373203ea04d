//! Remote mutation sinks.
//!
//! Every outbox item is delivered at least once, so sinks must treat a repeat
//! of the same item id as a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::http::{build_client, ensure_success, normalize_endpoint};
use crate::error::{Error, Result};
use crate::models::{MutationKind, OutboxItem};

/// Delivers one queued mutation to the remote system.
#[async_trait]
pub trait MutationSink: Send + Sync {
    async fn dispatch(&self, item: &OutboxItem) -> Result<()>;
}

/// Sink lookup by mutation kind.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: HashMap<MutationKind, Arc<dyn MutationSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `kind` to `sink`, replacing any previous route.
    pub fn register(&mut self, kind: MutationKind, sink: Arc<dyn MutationSink>) {
        self.sinks.insert(kind, sink);
    }

    #[must_use]
    pub fn with(mut self, kind: MutationKind, sink: Arc<dyn MutationSink>) -> Self {
        self.register(kind, sink);
        self
    }

    /// Route every kind to the same sink.
    #[must_use]
    pub fn with_all(mut self, sink: Arc<dyn MutationSink>) -> Self {
        for kind in MutationKind::ALL {
            self.register(kind, Arc::clone(&sink));
        }
        self
    }

    pub fn get(&self, kind: MutationKind) -> Option<&Arc<dyn MutationSink>> {
        self.sinks.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Dispatch through the sink for the item's kind.
    pub async fn dispatch(&self, item: &OutboxItem) -> Result<()> {
        let sink = self.get(item.kind).ok_or_else(|| {
            Error::NotConfigured(format!("no sink registered for {}", item.kind))
        })?;
        sink.dispatch(item).await
    }
}

/// POSTs payloads to `<base_url>/<kind>` with the item id as idempotency key.
#[derive(Clone)]
pub struct HttpMutationSink {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpMutationSink {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpMutationSink")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpMutationSink {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Self::with_client(base_url, token, build_client(timeout)?)
    }

    /// Use an existing client, sharing its connection pool and timeout.
    pub fn with_client(
        base_url: impl Into<String>,
        token: Option<String>,
        client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            base_url: normalize_endpoint(base_url)?,
            token,
            client,
        })
    }

    fn endpoint(&self, kind: MutationKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str())
    }
}

#[async_trait]
impl MutationSink for HttpMutationSink {
    async fn dispatch(&self, item: &OutboxItem) -> Result<()> {
        let mut request = self
            .client
            .post(self.endpoint(item.kind))
            .header("Idempotency-Key", item.id.as_str())
            .json(&item.payload);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        ensure_success(request.send().await?).await?;
        tracing::debug!("Delivered {} {}", item.kind, item.id);
        Ok(())
    }
}
