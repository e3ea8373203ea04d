//! Durable outbox for locally-originated mutations.
//!
//! [`Outbox::enqueue`] validates and persists an intent without touching the
//! network. [`Outbox::flush`] leases due items oldest-first, dispatches them
//! one at a time, deletes each on success and reschedules it with capped
//! exponential backoff on failure. Items are never dropped by a flush.
//!
//! The database lock is held only while claiming or updating rows, never
//! across a dispatch, so `enqueue` and reads proceed while a flush waits on
//! the network.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::sink::SinkRegistry;
use crate::clock::Clock;
use crate::db::{OutboxRepository, SharedDatabase, SqliteOutboxRepository};
use crate::error::{Error, Result};
use crate::models::{MutationKind, OutboxItem, OutboxItemId};

/// Delay after the first failure
pub const BACKOFF_BASE: Duration = Duration::from_secs(30);

/// Upper bound on any retry delay
pub const BACKOFF_CAP: Duration = Duration::from_secs(24 * 60 * 60);

const BACKOFF_MAX_EXPONENT: u32 = 16;

/// How long a flush pass owns the items it claimed
pub const DEFAULT_LEASE: Duration = Duration::from_secs(5 * 60);

/// Items claimed per flush when the caller has no preference
pub const DEFAULT_FLUSH_LIMIT: usize = 25;

/// Retry delay after `attempts` failed dispatches: `min(24h, 30s * 2^min(attempts, 16))`.
pub fn backoff(attempts: u32) -> Duration {
    let factor = 1_u32 << attempts.min(BACKOFF_MAX_EXPONENT);
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_CAP)
}

/// Counts from one flush pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlushSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Persistent queue of not-yet-acknowledged mutations.
#[derive(Clone)]
pub struct Outbox {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
    sinks: Arc<SinkRegistry>,
    lease: Duration,
}

impl Outbox {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>, sinks: Arc<SinkRegistry>) -> Self {
        Self {
            db,
            clock,
            sinks,
            lease: DEFAULT_LEASE,
        }
    }

    #[must_use]
    pub const fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Validate and persist a mutation intent.
    ///
    /// Returns `InvalidPayload` without persisting anything when the payload
    /// does not match the kind.
    pub async fn enqueue(&self, kind: MutationKind, payload: Value) -> Result<OutboxItemId> {
        kind.validate(&payload)?;
        let item = OutboxItem::new(kind, payload, self.clock.now());

        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).insert(&item)?;
        tracing::debug!("Queued {} {}", item.kind, item.id);
        Ok(item.id)
    }

    /// Dispatch up to `limit` due items, oldest first.
    pub async fn flush(&self, limit: usize) -> Result<FlushSummary> {
        let mut summary = FlushSummary::default();
        if limit == 0 {
            return Ok(summary);
        }

        let claimed = {
            let now = self.clock.now();
            let lease_until = offset(now, self.lease, "outbox lease")?;
            let db = self.db.lock().await;
            SqliteOutboxRepository::new(db.connection()).claim_due(now, limit, lease_until)?
        };

        for item in claimed {
            summary.processed += 1;
            let result = self.sinks.dispatch(&item).await;

            let db = self.db.lock().await;
            let repo = SqliteOutboxRepository::new(db.connection());
            match result {
                Ok(()) => {
                    repo.delete(&item.id)?;
                    summary.succeeded += 1;
                    tracing::debug!("Dispatched {} {}", item.kind, item.id);
                }
                Err(error) => {
                    let attempts = item.attempts.saturating_add(1);
                    let delay = backoff(attempts);
                    let next_attempt_at = offset(self.clock.now(), delay, "retry delay")?;
                    repo.record_failure(&item.id, attempts, &error.to_string(), next_attempt_at)?;
                    summary.failed += 1;
                    if error.is_retryable() {
                        tracing::warn!(
                            "Dispatch of {} {} failed (attempt {attempts}, retry in {delay:?}): {error}",
                            item.kind,
                            item.id
                        );
                    } else {
                        tracing::error!(
                            "Dispatch of {} {} hit a non-transient error (attempt {attempts}, retry in {delay:?}): {error}",
                            item.kind,
                            item.id
                        );
                    }
                }
            }
        }

        if summary.processed > 0 {
            tracing::info!(
                "Outbox flush: {} processed, {} succeeded, {} failed",
                summary.processed,
                summary.succeeded,
                summary.failed
            );
        }
        Ok(summary)
    }

    pub async fn get(&self, id: &OutboxItemId) -> Result<Option<OutboxItem>> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).get(id)
    }

    /// Queued items, oldest first
    pub async fn list(&self, limit: usize) -> Result<Vec<OutboxItem>> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).list(limit)
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).count()
    }

    /// Items a flush started now would pick up
    pub async fn due_count(&self) -> Result<usize> {
        let now = self.clock.now();
        let db = self.db.lock().await;
        SqliteOutboxRepository::new(db.connection()).count_due(now)
    }

    /// Operator override: make an item eligible on the next flush.
    pub async fn retry_now(&self, id: &OutboxItemId) -> Result<()> {
        let db = self.db.lock().await;
        if SqliteOutboxRepository::new(db.connection()).reset_schedule(id)? {
            tracing::info!("Rescheduled outbox item {id} for immediate retry");
            Ok(())
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }

    /// Operator override: discard an item that can never succeed.
    pub async fn drop_item(&self, id: &OutboxItemId) -> Result<()> {
        let db = self.db.lock().await;
        if SqliteOutboxRepository::new(db.connection()).delete(id)? {
            tracing::warn!("Dropped outbox item {id} by operator request");
            Ok(())
        } else {
            Err(Error::NotFound(id.to_string()))
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// `at + duration`, or `InvalidInput` when the result is not a representable time.
fn offset(at: DateTime<Utc>, duration: Duration, what: &str) -> Result<DateTime<Utc>> {
    at.checked_add_signed(to_chrono(duration))
        .ok_or_else(|| Error::InvalidInput(format!("{what} of {duration:?} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::Database;
    use crate::sync::sink::MutationSink;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Barrier;

    /// Sink whose verdict the test can flip between passes
    #[derive(Default)]
    struct SwitchSink {
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwitchSink {
        fn failing() -> Arc<Self> {
            let sink = Self::default();
            sink.failing.store(true, Ordering::SeqCst);
            Arc::new(sink)
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MutationSink for SwitchSink {
        async fn dispatch(&self, _item: &OutboxItem) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(Error::RemoteRejected("HTTP 503".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn setup(sink: Arc<SwitchSink>) -> (Outbox, ManualClock) {
        let db = Database::open_in_memory().unwrap().into_shared();
        let clock = ManualClock::default();
        let sinks = SinkRegistry::new().with_all(sink);
        let outbox = Outbox::new(db, Arc::new(clock.clone()), Arc::new(sinks));
        (outbox, clock)
    }

    fn lead_payload() -> Value {
        json!({"lead": {"id": "x1", "type": "buyerInquiry", "name": "A"}})
    }

    #[test]
    fn backoff_doubles_from_thirty_seconds() {
        assert_eq!(backoff(0), Duration::from_secs(30));
        assert_eq!(backoff(1), Duration::from_secs(60));
        assert_eq!(backoff(2), Duration::from_secs(120));
        assert_eq!(backoff(11), Duration::from_secs(30 * 2048));
    }

    #[test]
    fn backoff_is_monotonic_and_capped() {
        for attempts in 0..=16 {
            assert!(backoff(attempts + 1) >= backoff(attempts));
        }
        for attempts in [12, 16, 17, 64, u32::MAX] {
            assert_eq!(backoff(attempts), BACKOFF_CAP);
        }
    }

    #[tokio::test]
    async fn failed_then_successful_lead_insert() {
        let sink = SwitchSink::failing();
        let (outbox, clock) = setup(sink.clone());

        let id = outbox
            .enqueue(MutationKind::LeadInsert, lead_payload())
            .await
            .unwrap();

        let first = outbox.flush(10).await.unwrap();
        assert_eq!(
            first,
            FlushSummary {
                processed: 1,
                succeeded: 0,
                failed: 1
            }
        );
        let item = outbox.get(&id).await.unwrap().unwrap();
        assert_eq!(item.attempts, 1);
        assert_eq!(item.last_error.as_deref(), Some("Remote rejected: HTTP 503"));
        let next_attempt_at = item.next_attempt_at.unwrap();
        assert!(next_attempt_at > clock.now());

        clock.set(next_attempt_at);
        sink.set_failing(false);
        let second = outbox.flush(10).await.unwrap();
        assert_eq!(
            second,
            FlushSummary {
                processed: 1,
                succeeded: 1,
                failed: 0
            }
        );
        assert!(outbox.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn item_survives_repeated_failures() {
        let sink = SwitchSink::failing();
        let (outbox, clock) = setup(sink.clone());
        let id = outbox
            .enqueue(MutationKind::ListingArchive, json!({"id": "remote:9"}))
            .await
            .unwrap();

        for round in 1..=3 {
            if round > 1 {
                let item = outbox.get(&id).await.unwrap().unwrap();
                clock.set(item.next_attempt_at.unwrap());
            }
            let failed_at = clock.now();
            let summary = outbox.flush(10).await.unwrap();
            assert_eq!(summary.failed, 1);

            let item = outbox.get(&id).await.unwrap().unwrap();
            assert_eq!(item.attempts, round);
            assert_eq!(
                item.next_attempt_at.unwrap(),
                failed_at + to_chrono(backoff(round))
            );
        }

        let item = outbox.get(&id).await.unwrap().unwrap();
        assert!(item.next_attempt_at.unwrap() > clock.now());
        clock.set(item.next_attempt_at.unwrap());

        sink.set_failing(false);
        let summary = outbox.flush(10).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
        assert_eq!(sink.calls(), 4);
    }

    #[tokio::test]
    async fn backed_off_items_are_not_retried_early() {
        let sink = SwitchSink::failing();
        let (outbox, clock) = setup(sink.clone());
        outbox
            .enqueue(MutationKind::ListingDelete, json!({"id": "remote:1"}))
            .await
            .unwrap();

        outbox.flush(10).await.unwrap();
        clock.advance(backoff(1) - Duration::from_millis(1));

        let early = outbox.flush(10).await.unwrap();
        assert_eq!(early, FlushSummary::default());
        assert_eq!(sink.calls(), 1);
        assert_eq!(outbox.due_count().await.unwrap(), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(outbox.due_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn flush_respects_limit_in_fifo_order() {
        let sink = Arc::new(SwitchSink::default());
        let (outbox, clock) = setup(sink.clone());

        let mut ids = Vec::new();
        for n in 0..3 {
            let id = outbox
                .enqueue(MutationKind::ListingDelete, json!({"id": format!("remote:{n}")}))
                .await
                .unwrap();
            ids.push(id);
            clock.advance(Duration::from_millis(10));
        }

        let summary = outbox.flush(2).await.unwrap();
        assert_eq!(summary.processed, 2);

        let remaining: Vec<_> = outbox
            .list(10)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(remaining, vec![ids[2]]);
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_persisting() {
        let sink = Arc::new(SwitchSink::default());
        let (outbox, _clock) = setup(sink);

        let error = outbox
            .enqueue(MutationKind::LeadInsert, json!({"lead": {"id": "x1"}}))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::InvalidPayload(_)));
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_sink_counts_as_failure_and_keeps_item() {
        let db = Database::open_in_memory().unwrap().into_shared();
        let clock = ManualClock::default();
        let outbox = Outbox::new(db, Arc::new(clock), Arc::new(SinkRegistry::new()));

        let id = outbox
            .enqueue(MutationKind::ListingDelete, json!({"id": "remote:1"}))
            .await
            .unwrap();
        let summary = outbox.flush(10).await.unwrap();

        assert_eq!(summary.failed, 1);
        let item = outbox.get(&id).await.unwrap().unwrap();
        assert!(item.last_error.unwrap().contains("no sink registered"));
    }

    /// Sink that parks every dispatch until a partner dispatch arrives
    struct RendezvousSink {
        barrier: Barrier,
        dispatched: Mutex<Vec<OutboxItemId>>,
    }

    #[async_trait]
    impl MutationSink for RendezvousSink {
        async fn dispatch(&self, item: &OutboxItem) -> Result<()> {
            self.barrier.wait().await;
            self.dispatched.lock().unwrap().push(item.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_flushes_do_not_share_items() {
        let sink = Arc::new(RendezvousSink {
            barrier: Barrier::new(2),
            dispatched: Mutex::new(Vec::new()),
        });
        let db = Database::open_in_memory().unwrap().into_shared();
        let sinks = SinkRegistry::new().with_all(sink.clone());
        let outbox = Outbox::new(db, Arc::new(ManualClock::default()), Arc::new(sinks));
        for n in 0..4 {
            outbox
                .enqueue(MutationKind::ListingDelete, json!({"id": format!("remote:{n}")}))
                .await
                .unwrap();
        }

        // Each dispatch waits for one from the other flush, so both passes
        // hold their claimed items at the same time.
        let (a, b) = tokio::join!(outbox.flush(2), outbox.flush(2));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!((a.processed, b.processed), (2, 2));
        assert_eq!(a.succeeded + b.succeeded, 4);
        let mut dispatched = sink.dispatched.lock().unwrap().clone();
        assert_eq!(dispatched.len(), 4);
        dispatched.sort_by_key(ToString::to_string);
        dispatched.dedup();
        assert_eq!(dispatched.len(), 4);
        assert_eq!(outbox.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unrepresentable_lease_fails_flush_without_dispatch() {
        let sink = Arc::new(SwitchSink::default());
        let (outbox, _clock) = setup(sink.clone());
        let outbox = outbox.with_lease(Duration::from_secs(100_000_000_000_000));
        outbox
            .enqueue(MutationKind::LeadInsert, lead_payload())
            .await
            .unwrap();

        assert!(matches!(
            outbox.flush(10).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(sink.calls(), 0);
        assert_eq!(outbox.due_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retry_now_and_drop_item() {
        let sink = SwitchSink::failing();
        let (outbox, _clock) = setup(sink.clone());
        let id = outbox
            .enqueue(MutationKind::ListingDelete, json!({"id": "remote:1"}))
            .await
            .unwrap();
        outbox.flush(10).await.unwrap();
        assert_eq!(outbox.due_count().await.unwrap(), 0);

        outbox.retry_now(&id).await.unwrap();
        assert_eq!(outbox.due_count().await.unwrap(), 1);

        outbox.drop_item(&id).await.unwrap();
        assert!(matches!(
            outbox.drop_item(&id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            outbox.retry_now(&id).await,
            Err(Error::NotFound(_))
        ));
    }
}
