//! Sync metadata persistence in the key/value store.

use crate::db::KvStore;
use crate::error::Result;
use crate::models::SyncMeta;

const SYNC_META_PREFIX: &str = "sync:";

/// Load the metadata for `job`; a missing or unreadable record reads as `never`.
pub fn load_meta(kv: &impl KvStore, job: &str) -> Result<SyncMeta> {
    let Some(raw) = kv.get(&meta_key(job))? else {
        return Ok(SyncMeta::default());
    };
    Ok(serde_json::from_str(&raw).unwrap_or_else(|error| {
        tracing::warn!("Discarding unreadable sync metadata for {job}: {error}");
        SyncMeta::default()
    }))
}

/// Overwrite the metadata for `job`.
pub fn save_meta(kv: &impl KvStore, job: &str, meta: &SyncMeta) -> Result<()> {
    kv.put(&meta_key(job), &serde_json::to_string(meta)?)
}

/// Metadata for every job that has recorded at least one attempt.
pub fn list_meta(kv: &impl KvStore) -> Result<Vec<(String, SyncMeta)>> {
    let mut jobs = Vec::new();
    for (key, raw) in kv.scan(SYNC_META_PREFIX)? {
        let job = key[SYNC_META_PREFIX.len()..].to_string();
        if let Ok(meta) = serde_json::from_str(&raw) {
            jobs.push((job, meta));
        }
    }
    Ok(jobs)
}

fn meta_key(job: &str) -> String {
    format!("{SYNC_META_PREFIX}{job}")
}
