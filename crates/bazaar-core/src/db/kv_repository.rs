//! Key/value repository implementation

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

/// Small string key/value storage (settings, sync metadata, cache envelopes)
pub trait KvStore {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, reporting whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// All pairs whose key starts with `prefix`, ordered by key
    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// `SQLite` implementation of `KvStore`
pub struct SqliteKvRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteKvRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl KvStore for SqliteKvRepository<'_> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        // substr comparison instead of LIKE so `%` and `_` in keys stay literal
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM kv
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )?;

        let pairs = stmt
            .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(pairs)
    }
}
