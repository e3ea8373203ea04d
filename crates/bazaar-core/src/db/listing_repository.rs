//! Listing repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{Listing, ListingFilter, ListingId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const LISTING_COLUMNS: &str = "id, status, title, description, price_cents, currency, location, url, created_at, updated_at";

/// Trait for listing storage operations
pub trait ListingRepository {
    /// Insert a listing or fully replace the one with the same id
    fn upsert(&self, listing: &Listing) -> Result<()>;

    /// Upsert a batch inside one transaction, returning how many were written
    fn upsert_many(&self, listings: &[Listing]) -> Result<usize>;

    /// Get a listing by ID
    fn get(&self, id: &ListingId) -> Result<Option<Listing>>;

    /// Hard delete a listing, reporting whether it existed
    fn delete(&self, id: &ListingId) -> Result<bool>;

    /// Delete a batch inside one transaction, returning how many existed
    fn delete_many(&self, ids: &[ListingId]) -> Result<usize>;

    /// All listings matching the filter
    fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;

    /// Ids of every stored listing whose id starts with `prefix`
    fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<ListingId>>;

    /// Number of stored listings
    fn count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `ListingRepository`
pub struct SqliteListingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteListingRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn write(conn: &Connection, listing: &Listing) -> Result<()> {
        conn.execute(
            "INSERT INTO listings (id, status, title, description, price_cents, currency, location, url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                title = excluded.title,
                description = excluded.description,
                price_cents = excluded.price_cents,
                currency = excluded.currency,
                location = excluded.location,
                url = excluded.url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            params![
                listing.id.as_str(),
                listing.status.as_str(),
                listing.title,
                listing.description,
                listing.price_cents,
                listing.currency,
                listing.location,
                listing.url,
                listing.created_at,
                listing.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Parse a listing from a database row
    fn parse_listing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Listing> {
        let id: String = row.get(0)?;
        let status: String = row.get(1)?;
        Ok(Listing {
            id: ListingId::from(id),
            status: status.parse().unwrap_or_default(),
            title: row.get(2)?,
            description: row.get(3)?,
            price_cents: row.get(4)?,
            currency: row.get(5)?,
            location: row.get(6)?,
            url: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl ListingRepository for SqliteListingRepository<'_> {
    fn upsert(&self, listing: &Listing) -> Result<()> {
        Self::write(self.conn, listing)
    }

    fn upsert_many(&self, listings: &[Listing]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for listing in listings {
            Self::write(&tx, listing)?;
        }
        tx.commit()?;
        Ok(listings.len())
    }

    fn get(&self, id: &ListingId) -> Result<Option<Listing>> {
        let listing = self
            .conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?"),
                params![id.as_str()],
                Self::parse_listing,
            )
            .optional()?;
        Ok(listing)
    }

    fn delete(&self, id: &ListingId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM listings WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn delete_many(&self, ids: &[ListingId]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM listings WHERE id = ?")?;
            for id in ids {
                deleted += stmt.execute(params![id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn list(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(prefix) = filter.id_prefix.as_deref() {
            clauses.push("substr(id, 1, length(?)) = ?");
            values.push(Value::Text(prefix.to_string()));
            values.push(Value::Text(prefix.to_string()));
        }
        if let Some(text) = filter.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                clauses.push("instr(lower(title), lower(?)) > 0");
                values.push(Value::Text(text.to_string()));
            }
        }

        let mut sql = format!("SELECT {LISTING_COLUMNS} FROM listings");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(sort) = filter.sort {
            sql.push_str(" ORDER BY ");
            sql.push_str(sort.order_by());
        }
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map(params_from_iter(values), Self::parse_listing)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(listings)
    }

    fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<ListingId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM listings WHERE substr(id, 1, length(?1)) = ?1 ORDER BY id ASC",
        )?;

        let ids = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .map(|id| id.map(ListingId::from))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ids)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{ListingSort, ListingStatus};
    use crate::util::from_millis;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn listing(id: &str, title: &str, updated_ms: i64) -> Listing {
        let mut listing = Listing::new(title, from_millis(1_000));
        listing.id = ListingId::from(id);
        listing.updated_at = from_millis(updated_ms);
        listing
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let mut bike = listing("remote:1", "Road bike", 2_000);
        bike.price_cents = Some(45_000);
        bike.currency = Some("EUR".into());
        repo.upsert(&bike).unwrap();

        let fetched = repo.get(&bike.id).unwrap().unwrap();
        assert_eq!(fetched, bike);
    }

    #[test]
    fn test_upsert_same_id_replaces_fields() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let first = listing("remote:1", "Road bike", 2_000);
        let mut second = listing("remote:1", "Gravel bike", 3_000);
        second.status = ListingStatus::Archived;
        second.description = Some("Barely used".into());

        repo.upsert(&first).unwrap();
        repo.upsert(&second).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let fetched = repo.get(&first.id).unwrap().unwrap();
        assert_eq!(fetched, second);
    }

    #[test]
    fn test_upsert_clears_optional_fields() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let mut first = listing("a", "Lamp", 2_000);
        first.location = Some("Berlin".into());
        repo.upsert(&first).unwrap();

        let second = listing("a", "Lamp", 2_500);
        repo.upsert(&second).unwrap();

        assert_eq!(repo.get(&first.id).unwrap().unwrap().location, None);
    }

    #[test]
    fn test_get_missing() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        assert!(repo.get(&ListingId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let lamp = listing("a", "Lamp", 2_000);
        repo.upsert(&lamp).unwrap();

        assert!(repo.delete(&lamp.id).unwrap());
        assert!(!repo.delete(&lamp.id).unwrap());
        assert!(repo.get(&lamp.id).unwrap().is_none());
    }

    #[test]
    fn test_upsert_many_and_delete_many() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let batch = vec![
            listing("remote:1", "One", 1),
            listing("remote:2", "Two", 2),
            listing("remote:3", "Three", 3),
        ];
        assert_eq!(repo.upsert_many(&batch).unwrap(), 3);

        let deleted = repo
            .delete_many(&[ListingId::from("remote:1"), ListingId::from("nope")])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_list_filters() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let mut archived = listing("remote:2", "Old Sofa", 2_000);
        archived.status = ListingStatus::Archived;
        repo.upsert(&listing("remote:1", "Blue sofa", 1_000)).unwrap();
        repo.upsert(&archived).unwrap();
        repo.upsert(&listing("local-1", "Desk", 3_000)).unwrap();

        let active = repo
            .list(&ListingFilter::default().with_status(ListingStatus::Active))
            .unwrap();
        assert_eq!(active.len(), 2);

        let sofas = repo
            .list(
                &ListingFilter::default()
                    .with_text("SOFA")
                    .sorted_by(ListingSort::UpdatedDesc),
            )
            .unwrap();
        let titles: Vec<&str> = sofas.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Old Sofa", "Blue sofa"]);

        let remote = repo
            .list(&ListingFilter::default().with_id_prefix("remote:"))
            .unwrap();
        assert_eq!(remote.len(), 2);
    }

    #[test]
    fn test_list_sort_and_limit() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        let mut cheap = listing("a", "Cheap", 1);
        cheap.price_cents = Some(100);
        let mut pricey = listing("b", "Pricey", 2);
        pricey.price_cents = Some(9_000);
        let unpriced = listing("c", "Ask me", 3);
        repo.upsert_many(&[pricey, unpriced, cheap]).unwrap();

        let by_price = repo
            .list(&ListingFilter::default().sorted_by(ListingSort::PriceAsc))
            .unwrap();
        let ids: Vec<&str> = by_price.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let first_two = repo
            .list(
                &ListingFilter::default()
                    .sorted_by(ListingSort::TitleAsc)
                    .with_limit(2),
            )
            .unwrap();
        let titles: Vec<&str> = first_two.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Ask me", "Cheap"]);
    }

    #[test]
    fn test_ids_with_prefix() {
        let db = setup();
        let repo = SqliteListingRepository::new(db.connection());

        repo.upsert(&listing("remote:2", "B", 1)).unwrap();
        repo.upsert(&listing("remote:1", "A", 1)).unwrap();
        repo.upsert(&listing("local", "C", 1)).unwrap();

        let ids = repo.ids_with_prefix("remote:").unwrap();
        assert_eq!(
            ids,
            vec![ListingId::from("remote:1"), ListingId::from("remote:2")]
        );
    }
}
