//! Shared listing store used by every client.

use crate::db::{ListingRepository, SharedDatabase, SqliteListingRepository};
use crate::models::{Listing, ListingFilter, ListingId};
use crate::Result;

/// Thread-safe handle over the listings table.
#[derive(Clone)]
pub struct ListingStore {
    db: SharedDatabase,
}

impl ListingStore {
    pub const fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Insert a listing or fully replace the one with the same id.
    pub async fn upsert(&self, listing: &Listing) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());
        repo.upsert(listing)
    }

    /// Fetch a listing by id.
    pub async fn get(&self, id: &ListingId) -> Result<Option<Listing>> {
        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());
        repo.get(id)
    }

    /// Remove a listing, reporting whether it existed.
    pub async fn delete(&self, id: &ListingId) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());
        repo.delete(id)
    }

    /// Query listings.
    pub async fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());
        repo.list(filter)
    }

    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = SqliteListingRepository::new(db.connection());
        repo.count()
    }
}
