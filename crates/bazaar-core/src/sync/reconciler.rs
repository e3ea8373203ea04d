//! Pull-side reconciliation of the remote listing snapshot.
//!
//! One pass fetches the full remote snapshot, upserts every listing in it and
//! deletes stored remote-origin listings the snapshot no longer mentions.
//! Listings whose id lacks the remote-origin prefix are never touched. An
//! empty or unreadable snapshot leaves the local cache exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::meta::{load_meta, save_meta};
use super::parser::{ParsedSnapshot, SnapshotParser};
use super::source::SnapshotSource;
use crate::clock::Clock;
use crate::db::{ListingRepository, SharedDatabase, SqliteKvRepository, SqliteListingRepository};
use crate::error::{Error, Result};
use crate::models::{Listing, ListingId, SyncMeta, SyncStatus};

/// Sync job name used for the listings feed
pub const LISTINGS_JOB: &str = "listings";

/// Minimum spacing between successful unforced passes
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);

/// Default prefix marking listings owned by the reconciler
pub const DEFAULT_REMOTE_ID_PREFIX: &str = "remote:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub job: String,
    pub remote_id_prefix: String,
    pub throttle_window: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            job: LISTINGS_JOB.to_string(),
            remote_id_prefix: DEFAULT_REMOTE_ID_PREFIX.to_string(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        }
    }
}

/// Counts from a pass that reached the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub upserted: usize,
    pub deleted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A successful pass happened inside the throttle window
    Throttled { last_at: DateTime<Utc> },
    /// No snapshot source is available
    NotConfigured(String),
}

/// Typed result of one reconciliation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Synced(ReconcileStats),
    /// Applied, but some snapshot entries were rejected
    Partial(ReconcileStats),
    Skipped(SkipReason),
    Error(String),
}

impl ReconcileOutcome {
    /// Status an operator sees for this outcome
    pub const fn status(&self) -> SyncStatus {
        match self {
            Self::Synced(_) | Self::Partial(_) => SyncStatus::Ok,
            Self::Skipped(_) => SyncStatus::Skipped,
            Self::Error(_) => SyncStatus::Error,
        }
    }

    pub const fn stats(&self) -> Option<ReconcileStats> {
        match self {
            Self::Synced(stats) | Self::Partial(stats) => Some(*stats),
            Self::Skipped(_) | Self::Error(_) => None,
        }
    }
}

/// Merges the authoritative remote snapshot into the listing store.
#[derive(Clone)]
pub struct Reconciler {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
    source: Arc<dyn SnapshotSource>,
    parser: Arc<dyn SnapshotParser>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        db: SharedDatabase,
        clock: Arc<dyn Clock>,
        source: Arc<dyn SnapshotSource>,
        parser: Arc<dyn SnapshotParser>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            db,
            clock,
            source,
            parser,
            config,
        }
    }

    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Current metadata for this reconciler's job.
    pub async fn meta(&self) -> Result<SyncMeta> {
        let db = self.db.lock().await;
        load_meta(&SqliteKvRepository::new(db.connection()), &self.config.job)
    }

    /// Run one pass. `force` bypasses the throttle window.
    ///
    /// Fetch and parse failures are recorded and returned as
    /// [`ReconcileOutcome::Error`]; only local storage failures produce `Err`.
    pub async fn reconcile(&self, force: bool) -> Result<ReconcileOutcome> {
        let job = self.config.job.as_str();
        let now = self.clock.now();
        let previous = self.meta().await?;

        if !force && previous.is_fresh(now, self.throttle_window()) {
            if let Some(last_at) = previous.last_at {
                tracing::debug!("Skipping {job} reconcile; last success at {last_at}");
                return Ok(ReconcileOutcome::Skipped(SkipReason::Throttled { last_at }));
            }
        }

        let document = match self.source.fetch().await {
            Ok(document) => document,
            Err(Error::NotConfigured(reason)) => {
                tracing::info!("Skipping {job} reconcile: {reason}");
                self.record(&SyncMeta::skipped(previous.last_at, reason.clone()))
                    .await?;
                return Ok(ReconcileOutcome::Skipped(SkipReason::NotConfigured(reason)));
            }
            Err(error) => return self.fail(&previous, None, error.to_string()).await,
        };

        let parsed = match self.parser.parse(&document, now) {
            Ok(parsed) => parsed,
            Err(error) => return self.fail(&previous, None, error.to_string()).await,
        };

        if parsed.listings.is_empty() {
            let message = format!(
                "snapshot contained no usable listings ({} entries rejected); keeping cached listings",
                parsed.rejected.len()
            );
            return self.fail(&previous, Some(0), message).await;
        }

        let stats = self.apply(&parsed).await?;
        let note = (stats.rejected > 0)
            .then(|| format!("{} snapshot entries rejected", stats.rejected));
        let count = u64::try_from(stats.upserted).unwrap_or(u64::MAX);
        self.record(&SyncMeta::ok(now, count, note))
            .await?;

        tracing::info!(
            "Reconciled {job}: {} upserted, {} deleted, {} rejected",
            stats.upserted,
            stats.deleted,
            stats.rejected
        );

        if stats.rejected > 0 {
            Ok(ReconcileOutcome::Partial(stats))
        } else {
            Ok(ReconcileOutcome::Synced(stats))
        }
    }

    /// Upsert the snapshot and delete remote-origin listings it no longer contains.
    async fn apply(&self, parsed: &ParsedSnapshot) -> Result<ReconcileStats> {
        let prefix = self.config.remote_id_prefix.as_str();

        // Rejected entries that still named an id count as present so a
        // malformed row upstream does not delete the cached copy.
        let seen: HashSet<&ListingId> = parsed
            .listings
            .iter()
            .map(|listing| &listing.id)
            .chain(parsed.rejected.iter().filter_map(|entry| entry.id.as_ref()))
            .collect();

        let mut listings = latest_by_id(&parsed.listings);
        if listings.len() < parsed.listings.len() {
            tracing::debug!(
                "Snapshot repeated {} listing ids; keeping the last entry of each",
                parsed.listings.len() - listings.len()
            );
        }

        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());

        // A feed without creation times must not restamp rows it already sent.
        for listing in &mut listings {
            if parsed.undated.contains(&listing.id) {
                if let Some(stored) = repo.get(&listing.id)? {
                    listing.created_at = stored.created_at;
                }
            }
        }

        let upserted = repo.upsert_many(&listings)?;

        let deleted = if prefix.is_empty() {
            tracing::warn!("Remote id prefix is empty; skipping delete pass");
            0
        } else {
            let stale: Vec<ListingId> = repo
                .ids_with_prefix(prefix)?
                .into_iter()
                .filter(|id| id.is_remote(prefix) && !seen.contains(id))
                .collect();
            repo.delete_many(&stale)?
        };

        Ok(ReconcileStats {
            upserted,
            deleted,
            rejected: parsed.rejected.len(),
        })
    }

    async fn fail(
        &self,
        previous: &SyncMeta,
        count: Option<u64>,
        message: String,
    ) -> Result<ReconcileOutcome> {
        tracing::warn!("Reconcile of {} failed: {message}", self.config.job);
        self.record(&SyncMeta::error(previous.last_at, count, message.clone()))
            .await?;
        Ok(ReconcileOutcome::Error(message))
    }

    async fn record(&self, meta: &SyncMeta) -> Result<()> {
        let db = self.db.lock().await;
        save_meta(&SqliteKvRepository::new(db.connection()), &self.config.job, meta)
    }

    fn throttle_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.throttle_window).unwrap_or(chrono::Duration::MAX)
    }
}

/// Collapse repeated ids, keeping the last entry for each in first-seen order.
fn latest_by_id(listings: &[Listing]) -> Vec<Listing> {
    let mut positions: HashMap<&ListingId, usize> = HashMap::with_capacity(listings.len());
    let mut unique: Vec<Listing> = Vec::with_capacity(listings.len());
    for listing in listings {
        if let Some(&index) = positions.get(&listing.id) {
            unique[index] = listing.clone();
        } else {
            positions.insert(&listing.id, unique.len());
            unique.push(listing.clone());
        }
    }
    unique
}
