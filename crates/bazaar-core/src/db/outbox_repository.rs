//! Outbox repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::Result;
use crate::models::{OutboxItem, OutboxItemId};
use crate::util::from_millis;

const OUTBOX_COLUMNS: &str =
    "id, kind, payload, attempts, last_error, next_attempt_at, created_at, leased_until";

/// Trait for outbox storage operations
pub trait OutboxRepository {
    /// Persist a new item
    fn insert(&self, item: &OutboxItem) -> Result<()>;

    /// Get an item by ID
    fn get(&self, id: &OutboxItemId) -> Result<Option<OutboxItem>>;

    /// Atomically lease up to `limit` due, unleased items, oldest first
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<OutboxItem>>;

    /// Record a failed dispatch and release the lease
    fn record_failure(
        &self,
        id: &OutboxItemId,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Remove an item, reporting whether it existed
    fn delete(&self, id: &OutboxItemId) -> Result<bool>;

    /// Make an item eligible immediately, dropping any schedule or lease
    fn reset_schedule(&self, id: &OutboxItemId) -> Result<bool>;

    /// Items oldest first
    fn list(&self, limit: usize) -> Result<Vec<OutboxItem>>;

    /// Total queued items
    fn count(&self) -> Result<usize>;

    /// Items that a flush at `now` could claim
    fn count_due(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// `SQLite` implementation of `OutboxRepository`
pub struct SqliteOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an outbox item from a database row
    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxItem> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let next_attempt_at: Option<i64> = row.get(5)?;
        let leased_until: Option<i64> = row.get(7)?;
        Ok(OutboxItem {
            id: id
                .parse()
                .map_err(|error| conversion_error(0, Box::new(error)))?,
            kind: kind
                .parse()
                .map_err(|error| conversion_error(1, Box::new(error)))?,
            payload: row.get(2)?,
            attempts: row.get(3)?,
            last_error: row.get(4)?,
            next_attempt_at: next_attempt_at.map(from_millis),
            created_at: from_millis(row.get(6)?),
            leased_until: leased_until.map(from_millis),
        })
    }
}

fn conversion_error(
    column: usize,
    error: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error)
}

impl OutboxRepository for SqliteOutboxRepository<'_> {
    fn insert(&self, item: &OutboxItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO outbox (id, kind, payload, attempts, last_error, next_attempt_at, created_at, leased_until)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.id.as_str(),
                item.kind.as_str(),
                item.payload,
                item.attempts,
                item.last_error,
                item.next_attempt_at.map(|at| at.timestamp_millis()),
                item.created_at.timestamp_millis(),
                item.leased_until.map(|at| at.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &OutboxItemId) -> Result<Option<OutboxItem>> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = ?"),
                params![id.as_str()],
                Self::parse_item,
            )
            .optional()?;
        Ok(item)
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<OutboxItem>> {
        let now_ms = now.timestamp_millis();
        let lease_ms = lease_until.timestamp_millis();

        // IMMEDIATE takes the write lock up front so another process cannot
        // claim the same rows between our SELECT and UPDATE.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut items = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {OUTBOX_COLUMNS} FROM outbox
                 WHERE (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                   AND (leased_until IS NULL OR leased_until <= ?1)
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let due = stmt
                .query_map(params![now_ms, limit as i64], Self::parse_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            due
        };

        {
            let mut lease = tx.prepare("UPDATE outbox SET leased_until = ? WHERE id = ?")?;
            for item in &mut items {
                lease.execute(params![lease_ms, item.id.as_str()])?;
                item.leased_until = Some(lease_until);
            }
        }
        tx.commit()?;

        Ok(items)
    }

    fn record_failure(
        &self,
        id: &OutboxItemId,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE outbox
             SET attempts = ?, last_error = ?, next_attempt_at = ?, leased_until = NULL
             WHERE id = ?",
            params![
                attempts,
                error,
                next_attempt_at.timestamp_millis(),
                id.as_str()
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &OutboxItemId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM outbox WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn reset_schedule(&self, id: &OutboxItemId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE outbox SET next_attempt_at = NULL, leased_until = NULL WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn list(&self, limit: usize) -> Result<Vec<OutboxItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY created_at ASC, id ASC LIMIT ?"
        ))?;

        let items = stmt
            .query_map(params![limit as i64], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn count_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outbox
             WHERE (next_attempt_at IS NULL OR next_attempt_at <= ?1)
               AND (leased_until IS NULL OR leased_until <= ?1)",
            params![now.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::MutationKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn item_at(created_ms: i64) -> OutboxItem {
        OutboxItem::new(
            MutationKind::ListingArchive,
            json!({"id": format!("remote:{created_ms}")}),
            from_millis(created_ms),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());

        let item = item_at(1_000);
        repo.insert(&item).unwrap();

        let fetched = repo.get(&item.id).unwrap().unwrap();
        assert_eq!(fetched, item);
    }

    #[test]
    fn test_claim_due_is_fifo_and_limited() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());

        let newest = item_at(3_000);
        let oldest = item_at(1_000);
        let middle = item_at(2_000);
        for item in [&newest, &oldest, &middle] {
            repo.insert(item).unwrap();
        }

        let now = from_millis(10_000);
        let claimed = repo.claim_due(now, 2, from_millis(70_000)).unwrap();
        let ids: Vec<_> = claimed.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![oldest.id, middle.id]);
        assert!(claimed
            .iter()
            .all(|item| item.leased_until == Some(from_millis(70_000))));
    }

    #[test]
    fn test_leased_items_are_not_claimed_twice() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());
        repo.insert(&item_at(1_000)).unwrap();

        let now = from_millis(10_000);
        let first = repo.claim_due(now, 10, from_millis(20_000)).unwrap();
        let second = repo.claim_due(now, 10, from_millis(20_000)).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        // An abandoned lease expires
        let later = repo
            .claim_due(from_millis(20_000), 10, from_millis(30_000))
            .unwrap();
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn test_record_failure_schedules_and_releases() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());
        let item = item_at(1_000);
        repo.insert(&item).unwrap();

        let now = from_millis(10_000);
        repo.claim_due(now, 10, from_millis(20_000)).unwrap();
        repo.record_failure(&item.id, 1, "HTTP 503", from_millis(70_000))
            .unwrap();

        let stored = repo.get(&item.id).unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(stored.next_attempt_at, Some(from_millis(70_000)));
        assert_eq!(stored.leased_until, None);

        assert!(repo.claim_due(from_millis(69_999), 10, from_millis(80_000)).unwrap().is_empty());
        assert_eq!(repo.count_due(from_millis(70_000)).unwrap(), 1);
    }

    #[test]
    fn test_reset_schedule_and_delete() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());
        let item = item_at(1_000);
        repo.insert(&item).unwrap();
        repo.record_failure(&item.id, 4, "boom", from_millis(999_999))
            .unwrap();

        assert_eq!(repo.count_due(from_millis(2_000)).unwrap(), 0);
        assert!(repo.reset_schedule(&item.id).unwrap());
        assert_eq!(repo.count_due(from_millis(2_000)).unwrap(), 1);
        // Attempts history survives a manual retry
        assert_eq!(repo.get(&item.id).unwrap().unwrap().attempts, 4);

        assert!(repo.delete(&item.id).unwrap());
        assert!(!repo.delete(&item.id).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_list_oldest_first() {
        let db = setup();
        let repo = SqliteOutboxRepository::new(db.connection());
        repo.insert(&item_at(2_000)).unwrap();
        repo.insert(&item_at(1_000)).unwrap();

        let listed = repo.list(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at < listed[1].created_at);
    }
}
