//! Time-bounded cache for expensive derived reads.
//!
//! Entries live in the key/value table as JSON envelopes
//! (`{"fetchedAt": <unix ms>, "data": ...}`) under the `cache:` namespace. An
//! entry is served only while `now - fetchedAt <= max_age`; expired or
//! malformed envelopes read as absent and are left for
//! [`TtlCache::purge_expired`] to clean up.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::db::{KvStore, SharedDatabase, SqliteKvRepository};
use crate::error::Result;

const CACHE_KEY_PREFIX: &str = "cache:";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEnvelope<T> {
    fetched_at: i64,
    data: T,
}

/// JSON value cache with per-read maximum age
#[derive(Clone)]
pub struct TtlCache {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Read `key` if it was written no more than `max_age` ago.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Result<Option<T>> {
        let raw = {
            let db = self.db.lock().await;
            SqliteKvRepository::new(db.connection()).get(&storage_key(key))?
        };
        let Some(raw) = raw else {
            return Ok(None);
        };

        let envelope = match serde_json::from_str::<CacheEnvelope<T>>(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!("Ignoring malformed cache entry {key}: {error}");
                return Ok(None);
            }
        };

        if self.is_expired(envelope.fetched_at, max_age) {
            tracing::debug!("Cache entry {key} expired");
            return Ok(None);
        }
        Ok(Some(envelope.data))
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let envelope = CacheEnvelope {
            fetched_at: self.clock.now_millis(),
            data: value,
        };
        let raw = serde_json::to_string(&envelope)?;

        let db = self.db.lock().await;
        SqliteKvRepository::new(db.connection()).put(&storage_key(key), &raw)
    }

    /// Drop one entry regardless of age.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteKvRepository::new(db.connection()).delete(&storage_key(key))
    }

    /// Delete every entry older than `max_age` (and any that no longer parse).
    pub async fn purge_expired(&self, max_age: Duration) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = SqliteKvRepository::new(db.connection());

        let mut purged = 0;
        for (key, raw) in repo.scan(CACHE_KEY_PREFIX)? {
            let keep = serde_json::from_str::<CacheEnvelope<serde_json::Value>>(&raw)
                .is_ok_and(|envelope| !self.is_expired(envelope.fetched_at, max_age));
            if !keep && repo.delete(&key)? {
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::info!("Purged {purged} expired cache entries");
        }
        Ok(purged)
    }

    fn is_expired(&self, fetched_at: i64, max_age: Duration) -> bool {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_sub(fetched_at) > max_age_ms
    }
}

fn storage_key(key: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{key}")
}
