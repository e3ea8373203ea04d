//! Snapshot document parsing.
//!
//! The remote feed is a JSON document: either a bare array of listing entries
//! or an object with a `listings` array. Entries that cannot be turned into a
//! [`Listing`] are reported individually instead of failing the whole parse.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Listing, ListingId, ListingStatus};

/// An entry the parser could not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// Remote id, when the entry carried one
    pub id: Option<ListingId>,
    pub reason: String,
}

/// Result of parsing one snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSnapshot {
    pub listings: Vec<Listing>,
    pub rejected: Vec<RejectedEntry>,
    /// Ids whose last entry had no creation time; `created_at` holds the fetch time
    pub undated: HashSet<ListingId>,
}

/// Maps a raw snapshot document to listings.
pub trait SnapshotParser: Send + Sync {
    /// `fetched_at` fills in timestamps the document leaves out.
    fn parse(&self, document: &str, fetched_at: DateTime<Utc>) -> Result<ParsedSnapshot>;
}

/// Parser for the JSON listings feed.
#[derive(Debug, Clone)]
pub struct JsonSnapshotParser {
    remote_id_prefix: String,
}

impl JsonSnapshotParser {
    pub fn new(remote_id_prefix: impl Into<String>) -> Self {
        Self {
            remote_id_prefix: remote_id_prefix.into(),
        }
    }

    /// The listing and whether the entry carried its own creation time.
    fn parse_entry(
        &self,
        entry: &Value,
        fetched_at: DateTime<Utc>,
    ) -> std::result::Result<(Listing, bool), RejectedEntry> {
        let id = entry
            .get("id")
            .and_then(raw_id)
            .map(|raw| ListingId::remote(&self.remote_id_prefix, &raw));

        let reject = |reason: String| RejectedEntry {
            id: id.clone(),
            reason,
        };

        let Some(listing_id) = id.clone() else {
            return Err(reject("entry has no id".to_string()));
        };

        let raw = RawListing::deserialize(entry).map_err(|error| reject(error.to_string()))?;

        let title = raw.title.trim();
        if title.is_empty() {
            return Err(reject("entry has an empty title".to_string()));
        }

        let status = match raw.status.as_deref() {
            None => ListingStatus::Active,
            Some(value) => value.parse().map_err(|error: Error| reject(error.to_string()))?,
        };

        let dated = raw.created_at.is_some();
        let created_at = raw.created_at.unwrap_or(fetched_at);
        let listing = Listing {
            id: listing_id,
            status,
            title: title.to_string(),
            description: raw.description,
            price_cents: raw.price_cents,
            currency: raw.currency,
            location: raw.location,
            url: raw.url,
            created_at,
            updated_at: raw.updated_at.unwrap_or(created_at),
        };
        Ok((listing, dated))
    }
}

impl SnapshotParser for JsonSnapshotParser {
    fn parse(&self, document: &str, fetched_at: DateTime<Utc>) -> Result<ParsedSnapshot> {
        let root: Value = serde_json::from_str(document)
            .map_err(|error| Error::ParseFailure(format!("snapshot is not valid JSON: {error}")))?;

        let entries = match &root {
            Value::Array(entries) => entries,
            Value::Object(map) => match map.get("listings") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(Error::ParseFailure(
                        "snapshot object has no `listings` array".to_string(),
                    ))
                }
            },
            _ => {
                return Err(Error::ParseFailure(
                    "snapshot must be an array or an object".to_string(),
                ))
            }
        };

        let mut parsed = ParsedSnapshot::default();
        for entry in entries {
            match self.parse_entry(entry, fetched_at) {
                Ok((listing, dated)) => {
                    if dated {
                        parsed.undated.remove(&listing.id);
                    } else {
                        parsed.undated.insert(listing.id.clone());
                    }
                    parsed.listings.push(listing);
                }
                Err(rejected) => {
                    tracing::debug!("Rejected snapshot entry {:?}: {}", rejected.id, rejected.reason);
                    parsed.rejected.push(rejected);
                }
            }
        }
        Ok(parsed)
    }
}

fn raw_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(id) => id.trim().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    title: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "price_cents")]
    price_cents: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, alias = "created_at")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at")]
    updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::from_millis;
    use pretty_assertions::assert_eq;

    fn parser() -> JsonSnapshotParser {
        JsonSnapshotParser::new("remote:")
    }

    #[test]
    fn parses_bare_array() {
        let doc = r#"[
            {"id": "17", "title": "Desk", "priceCents": 5000, "currency": "EUR",
             "createdAt": "2024-03-01T10:00:00Z", "updatedAt": "2024-03-02T10:00:00Z"},
            {"id": 18, "title": "Chair", "status": "archived"}
        ]"#;
        let fetched_at = from_millis(1_700_000_000_000);

        let parsed = parser().parse(doc, fetched_at).unwrap();
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.listings.len(), 2);

        let desk = &parsed.listings[0];
        assert_eq!(desk.id.as_str(), "remote:17");
        assert_eq!(desk.price_cents, Some(5000));
        assert_eq!(desk.status, ListingStatus::Active);
        assert!(desk.updated_at > desk.created_at);

        let chair = &parsed.listings[1];
        assert_eq!(chair.id.as_str(), "remote:18");
        assert_eq!(chair.status, ListingStatus::Archived);
        assert_eq!(chair.created_at, fetched_at);
        assert_eq!(chair.updated_at, fetched_at);
    }

    #[test]
    fn parses_wrapped_object_and_keeps_existing_prefix() {
        let doc = r#"{"listings": [{"id": "remote:5", "title": "Lamp"}]}"#;
        let parsed = parser().parse(doc, from_millis(0)).unwrap();
        assert_eq!(parsed.listings[0].id.as_str(), "remote:5");
    }

    #[test]
    fn rejects_bad_entries_individually() {
        let doc = r#"[
            {"id": "1", "title": "Good"},
            {"id": "2", "title": "   "},
            {"id": "3", "title": "Weird", "status": "sold"},
            {"title": "No id"},
            {"id": "4"}
        ]"#;
        let parsed = parser().parse(doc, from_millis(0)).unwrap();

        assert_eq!(parsed.listings.len(), 1);
        let rejected_ids: Vec<Option<&str>> = parsed
            .rejected
            .iter()
            .map(|entry| entry.id.as_ref().map(ListingId::as_str))
            .collect();
        assert_eq!(
            rejected_ids,
            vec![Some("remote:2"), Some("remote:3"), None, Some("remote:4")]
        );
    }

    #[test]
    fn tracks_entries_without_creation_time() {
        let doc = r#"[
            {"id": "1", "title": "Undated"},
            {"id": "2", "title": "Dated", "createdAt": "2024-03-01T10:00:00Z"},
            {"id": "3", "title": "Early copy"},
            {"id": "3", "title": "Later copy", "created_at": "2024-03-01T10:00:00Z"}
        ]"#;
        let parsed = parser().parse(doc, from_millis(0)).unwrap();

        let mut undated: Vec<&str> = parsed.undated.iter().map(ListingId::as_str).collect();
        undated.sort_unstable();
        assert_eq!(undated, vec!["remote:1"]);
    }

    #[test]
    fn empty_array_parses_to_nothing() {
        let parsed = parser().parse("[]", from_millis(0)).unwrap();
        assert_eq!(parsed, ParsedSnapshot::default());
    }

    #[test]
    fn unrecognized_documents_fail() {
        for doc in ["<html>maintenance</html>", "42", r#"{"items": []}"#] {
            let error = parser().parse(doc, from_millis(0)).unwrap_err();
            assert!(matches!(error, Error::ParseFailure(_)), "{doc}");
        }
    }
}
