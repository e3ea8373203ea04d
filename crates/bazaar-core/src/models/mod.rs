//! Data models for Bazaar

mod listing;
mod outbox;
mod sync_meta;

pub use listing::{Listing, ListingFilter, ListingId, ListingSort, ListingStatus};
pub use outbox::{MutationKind, OutboxItem, OutboxItemId};
pub use sync_meta::{SyncMeta, SyncStatus};
