//! Database layer for Bazaar

mod connection;
mod kv_repository;
mod listing_repository;
mod migrations;
mod outbox_repository;

pub use connection::{Database, SharedDatabase};
pub use kv_repository::{KvStore, SqliteKvRepository};
pub use listing_repository::{ListingRepository, SqliteListingRepository};
pub use outbox_repository::{OutboxRepository, SqliteOutboxRepository};
