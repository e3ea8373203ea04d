use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] bazaar_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid outbox item ID: {0}")]
    InvalidOutboxId(String),
    #[error("Listing ID cannot be empty")]
    EmptyListingId,
    #[error("Listing not found: {0}")]
    ListingNotFound(String),
    #[error("Could not resolve a data directory; pass --db-path or set BAZAAR_DB_PATH")]
    NoDataDir,
}
