//! Outbox item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a queued mutation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboxItemId(Uuid);

impl OutboxItemId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OutboxItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutboxItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutboxItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Closed set of mutations the client can queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A buyer inquiry or other lead attached to a listing
    LeadInsert,
    /// Create or fully replace a listing
    ListingUpsert,
    /// Withdraw a listing
    ListingArchive,
    /// Remove a listing
    ListingDelete,
}

impl MutationKind {
    pub const ALL: [Self; 4] = [
        Self::LeadInsert,
        Self::ListingUpsert,
        Self::ListingArchive,
        Self::ListingDelete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadInsert => "lead_insert",
            Self::ListingUpsert => "listing_upsert",
            Self::ListingArchive => "listing_archive",
            Self::ListingDelete => "listing_delete",
        }
    }

    /// Check that `payload` has the shape the remote sink for this kind expects.
    pub fn validate(self, payload: &Value) -> Result<()> {
        match self {
            Self::LeadInsert => {
                let lead = required_object(payload, "lead")?;
                for field in ["id", "type", "name"] {
                    required_text(lead, field, "lead")?;
                }
            }
            Self::ListingUpsert => {
                let listing = required_object(payload, "listing")?;
                for field in ["id", "title"] {
                    required_text(listing, field, "listing")?;
                }
            }
            Self::ListingArchive | Self::ListingDelete => {
                required_text(payload, "id", "payload")?;
            }
        }
        Ok(())
    }
}

fn required_object<'a>(payload: &'a Value, field: &str) -> Result<&'a Value> {
    payload
        .get(field)
        .filter(|value| value.is_object())
        .ok_or_else(|| Error::InvalidPayload(format!("`{field}` must be an object")))
}

fn required_text(parent: &Value, field: &str, context: &str) -> Result<()> {
    let present = parent
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|value| !value.trim().is_empty());
    if present {
        Ok(())
    } else {
        Err(Error::InvalidPayload(format!(
            "`{context}.{field}` must be a non-empty string"
        )))
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown mutation kind: {s}")))
    }
}

/// A mutation waiting for remote acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    pub id: OutboxItemId,
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub payload: Value,
    /// Failed dispatches so far
    pub attempts: u32,
    pub last_error: Option<String>,
    /// `None` means eligible immediately
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Claim held by an in-flight flush pass
    pub leased_until: Option<DateTime<Utc>>,
}

impl OutboxItem {
    pub fn new(kind: MutationKind, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: OutboxItemId::new(),
            kind,
            payload,
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            leased_until: None,
        }
    }

    /// Whether the retry schedule allows dispatching at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
