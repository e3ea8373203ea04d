//! Background trigger tying the reconciler and the outbox together.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ListingStore;
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::AppContext;
use crate::db::{SharedDatabase, SqliteKvRepository};
use crate::models::SyncMeta;
use crate::sync::{
    build_client, list_meta, FlushSummary, HttpMutationSink, HttpSnapshotSource, JsonSnapshotParser, Outbox,
    ReconcileOutcome, Reconciler, ReconcilerConfig, SinkRegistry, SnapshotSource,
    UnconfiguredSource, LISTINGS_JOB,
};
use crate::Result;

/// Result of one reconcile-then-flush cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub reconcile: ReconcileOutcome,
    pub flush: FlushSummary,
}

/// Snapshot of sync health for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    pub jobs: Vec<(String, SyncMeta)>,
    pub pending_mutations: usize,
    pub due_mutations: usize,
    pub listings: usize,
}

/// Owns the sync components that share one database.
#[derive(Clone)]
pub struct SyncService {
    store: ListingStore,
    cache: TtlCache,
    reconciler: Reconciler,
    outbox: Outbox,
    db: SharedDatabase,
    flush_limit: usize,
}

impl SyncService {
    /// Build the service from validated configuration.
    ///
    /// Endpoints left unset degrade to `NotConfigured` at call time rather
    /// than failing here.
    pub fn from_context(db: SharedDatabase, context: &AppContext) -> Result<Self> {
        let config = context.config();
        let clock = context.clock();
        let client = build_client(config.http_timeout())?;

        let source: Arc<dyn SnapshotSource> = match config.snapshot_url.as_deref() {
            Some(url) => Arc::new(HttpSnapshotSource::with_client(
                url,
                config.snapshot_token.clone(),
                client.clone(),
            )?),
            None => {
                tracing::info!("No snapshot endpoint configured; reconcile will be skipped");
                Arc::new(UnconfiguredSource)
            }
        };

        let sinks = match config.mutation_base_url.as_deref() {
            Some(base_url) => SinkRegistry::new().with_all(Arc::new(
                HttpMutationSink::with_client(base_url, config.mutation_token.clone(), client)?,
            )),
            None => {
                tracing::info!("No mutation endpoint configured; queued mutations will wait");
                SinkRegistry::new()
            }
        };

        let reconciler = Reconciler::new(
            Arc::clone(&db),
            Arc::clone(&clock),
            source,
            Arc::new(JsonSnapshotParser::new(config.remote_id_prefix.clone())),
            ReconcilerConfig {
                job: LISTINGS_JOB.to_string(),
                remote_id_prefix: config.remote_id_prefix.clone(),
                throttle_window: config.throttle_window(),
            },
        );
        let outbox = Outbox::new(Arc::clone(&db), Arc::clone(&clock), Arc::new(sinks))
            .with_lease(config.lease());

        Ok(Self::from_parts(db, clock, reconciler, outbox, config.flush_batch_limit))
    }

    /// Assemble the service from prebuilt components.
    pub fn from_parts(
        db: SharedDatabase,
        clock: Arc<dyn Clock>,
        reconciler: Reconciler,
        outbox: Outbox,
        flush_limit: usize,
    ) -> Self {
        Self {
            store: ListingStore::new(Arc::clone(&db)),
            cache: TtlCache::new(Arc::clone(&db), clock),
            reconciler,
            outbox,
            db,
            flush_limit,
        }
    }

    pub const fn store(&self) -> &ListingStore {
        &self.store
    }

    pub const fn cache(&self) -> &TtlCache {
        &self.cache
    }

    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Pull the remote snapshot, then push due mutations.
    pub async fn tick(&self) -> Result<TickReport> {
        let reconcile = self.reconciler.reconcile(false).await?;
        let flush = self.outbox.flush(self.flush_limit).await?;
        Ok(TickReport { reconcile, flush })
    }

    pub async fn status(&self) -> Result<SyncStatusReport> {
        let jobs = {
            let db = self.db.lock().await;
            list_meta(&SqliteKvRepository::new(db.connection()))?
        };
        Ok(SyncStatusReport {
            jobs,
            pending_mutations: self.outbox.pending_count().await?,
            due_mutations: self.outbox.due_count().await?,
            listings: self.store.count().await?,
        })
    }

    /// Run [`Self::tick`] every `interval` until the handle is aborted.
    ///
    /// Storage failures are logged and the next tick proceeds.
    pub fn spawn_periodic(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.tick().await {
                    Ok(report) => tracing::debug!(
                        "Sync tick: reconcile {}, {} mutations flushed",
                        report.reconcile.status(),
                        report.flush.succeeded
                    ),
                    Err(error) => tracing::error!("Sync tick failed: {error}"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SyncConfig;
    use crate::db::Database;
    use crate::models::{ListingId, MutationKind, OutboxItem, SyncStatus};
    use crate::sync::{MutationSink, SkipReason};
    use crate::Error;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        document: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.document.to_string())
        }
    }

    struct CountingSource(Arc<AtomicUsize>);

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn fetch(&self) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::NotConfigured("offline".to_string()))
        }
    }

    struct AcceptingSink;

    #[async_trait]
    impl MutationSink for AcceptingSink {
        async fn dispatch(&self, _item: &OutboxItem) -> Result<()> {
            Ok(())
        }
    }

    fn service(source: Arc<dyn SnapshotSource>) -> SyncService {
        let db = Database::open_in_memory().unwrap().into_shared();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let reconciler = Reconciler::new(
            Arc::clone(&db),
            Arc::clone(&clock),
            source,
            Arc::new(JsonSnapshotParser::new("remote:")),
            ReconcilerConfig::default(),
        );
        let sinks = SinkRegistry::new().with_all(Arc::new(AcceptingSink));
        let outbox = Outbox::new(Arc::clone(&db), Arc::clone(&clock), Arc::new(sinks));
        SyncService::from_parts(db, clock, reconciler, outbox, 10)
    }

    #[tokio::test]
    async fn tick_reconciles_then_flushes() {
        let service = service(Arc::new(FixedSource {
            document: r#"[{"id": 1, "title": "Bike"}]"#,
            calls: AtomicUsize::new(0),
        }));
        service
            .outbox()
            .enqueue(MutationKind::ListingArchive, json!({"id": "remote:1"}))
            .await
            .unwrap();

        let report = service.tick().await.unwrap();

        assert_eq!(report.reconcile.status(), SyncStatus::Ok);
        assert_eq!(report.flush.succeeded, 1);
        assert!(service
            .store()
            .get(&ListingId::from("remote:1"))
            .await
            .unwrap()
            .is_some());

        let status = service.status().await.unwrap();
        assert_eq!(status.pending_mutations, 0);
        assert_eq!(status.listings, 1);
        assert_eq!(status.jobs.len(), 1);
        assert_eq!(status.jobs[0].1.status, SyncStatus::Ok);
    }

    #[tokio::test]
    async fn second_tick_is_throttled() {
        let source = Arc::new(FixedSource {
            document: r#"[{"id": 1, "title": "Bike"}]"#,
            calls: AtomicUsize::new(0),
        });
        let service = service(source.clone());

        service.tick().await.unwrap();
        let report = service.tick().await.unwrap();

        assert!(matches!(
            report.reconcile,
            ReconcileOutcome::Skipped(SkipReason::Throttled { .. })
        ));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_context_degrades_to_skips() {
        let db = Database::open_in_memory().unwrap().into_shared();
        let context = AppContext::with_clock(
            SyncConfig::default(),
            Arc::new(ManualClock::default()),
        );
        let service = SyncService::from_context(db, &context).unwrap();
        let id = service
            .outbox()
            .enqueue(MutationKind::ListingDelete, json!({"id": "remote:7"}))
            .await
            .unwrap();

        let report = service.tick().await.unwrap();

        assert!(matches!(
            report.reconcile,
            ReconcileOutcome::Skipped(SkipReason::NotConfigured(_))
        ));
        assert_eq!(report.flush.failed, 1);
        assert_eq!(service.outbox().get(&id).await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn periodic_task_keeps_ticking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service(Arc::new(CountingSource(Arc::clone(&calls))));

        let handle = service.spawn_periodic(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(calls.load(Ordering::SeqCst) >= 2);
    }
}
