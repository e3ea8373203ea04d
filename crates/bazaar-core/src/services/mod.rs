//! Thread-safe services shared across clients.

mod listing_store;
mod sync_service;

pub use listing_store::ListingStore;
pub use sync_service::{SyncService, SyncStatusReport, TickReport};
