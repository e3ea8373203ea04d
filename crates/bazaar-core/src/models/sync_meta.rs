//! Per-job sync bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the most recent reconciliation attempt for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No attempt recorded yet
    #[default]
    Never,
    Ok,
    /// Attempt was skipped because a remote dependency is unavailable
    Skipped,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Never => "never",
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Persisted state of one named sync job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    pub status: SyncStatus,
    pub last_at: Option<DateTime<Utc>>,
    pub last_count: Option<u64>,
    pub last_error: Option<String>,
}

impl SyncMeta {
    pub fn ok(at: DateTime<Utc>, count: u64, note: Option<String>) -> Self {
        Self {
            status: SyncStatus::Ok,
            last_at: Some(at),
            last_count: Some(count),
            last_error: note,
        }
    }

    /// `last_at` carries over the time of the previous attempt
    pub fn error(
        last_at: Option<DateTime<Utc>>,
        count: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: SyncStatus::Error,
            last_at,
            last_count: count,
            last_error: Some(message.into()),
        }
    }

    pub fn skipped(last_at: Option<DateTime<Utc>>, reason: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Skipped,
            last_at,
            last_count: None,
            last_error: Some(reason.into()),
        }
    }

    /// Whether a successful pass happened less than `window` before `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match (self.status, self.last_at) {
            (SyncStatus::Ok, Some(last_at)) => now - last_at < window,
            _ => false,
        }
    }
}
