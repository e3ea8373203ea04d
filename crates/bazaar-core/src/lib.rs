//! bazaar-core - Offline sync core for the Bazaar marketplace client
//!
//! This crate holds the local listing cache, the key/value store, the TTL
//! cache, the snapshot reconciler and the durable mutation outbox shared by
//! every Bazaar client.

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use cache::TtlCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AdminOverrides, AppContext, SyncConfig};
pub use error::{Error, Result};
pub use models::{Listing, ListingFilter, ListingId, MutationKind, OutboxItem, OutboxItemId};
pub use services::{ListingStore, SyncService};
