//! Listing model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Opaque listing identifier.
///
/// Listings created on this device use a bare UUID v7; listings imported from
/// the remote snapshot carry the configured remote-origin prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    /// Create a new locally-originated listing ID
    #[must_use]
    pub fn new_local() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id belongs to the remote-origin namespace
    #[must_use]
    pub fn is_remote(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }

    /// Build a remote-origin id, adding `prefix` unless it is already present
    #[must_use]
    pub fn remote(prefix: &str, raw: &str) -> Self {
        if raw.starts_with(prefix) {
            Self(raw.to_string())
        } else {
            Self(format!("{prefix}{raw}"))
        }
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ListingId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Listing ID cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for ListingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ListingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Visible in the marketplace
    #[default]
    Active,
    /// Withdrawn by the seller
    Archived,
}

impl ListingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(Error::InvalidInput(format!(
                "Unknown listing status: {other}"
            ))),
        }
    }
}

/// A marketplace listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Unique identifier
    pub id: ListingId,
    /// Lifecycle status
    pub status: ListingStatus,
    /// Headline shown in lists
    pub title: String,
    /// Free-form body
    pub description: Option<String>,
    /// Asking price in minor currency units
    pub price_cents: Option<i64>,
    /// ISO 4217 currency code
    pub currency: Option<String>,
    /// Human-readable location
    pub location: Option<String>,
    /// Canonical URL of the listing on the remote site
    pub url: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Create a new active, locally-originated listing
    #[must_use]
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingId::new_local(),
            status: ListingStatus::Active,
            title: title.into(),
            description: None,
            price_cents: None,
            currency: None,
            location: None,
            url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sort order for listing queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSort {
    /// Most recently updated first
    UpdatedDesc,
    /// Most recently created first
    CreatedDesc,
    /// Cheapest first, unpriced last
    PriceAsc,
    /// Alphabetical by title, case-insensitive
    TitleAsc,
}

impl ListingSort {
    pub(crate) const fn order_by(self) -> &'static str {
        match self {
            Self::UpdatedDesc => "updated_at DESC, id ASC",
            Self::CreatedDesc => "created_at DESC, id ASC",
            Self::PriceAsc => "price_cents IS NULL, price_cents ASC, id ASC",
            Self::TitleAsc => "title COLLATE NOCASE ASC, id ASC",
        }
    }
}

/// Query over stored listings; every unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub id_prefix: Option<String>,
    /// Case-insensitive substring of the title
    pub text: Option<String>,
    pub sort: Option<ListingSort>,
    pub limit: Option<usize>,
}

impl ListingFilter {
    #[must_use]
    pub const fn with_status(mut self, status: ListingStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub const fn sorted_by(mut self, sort: ListingSort) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
