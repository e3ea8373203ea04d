pub mod cache;
pub mod common;
pub mod flush;
pub mod listings;
pub mod outbox;
pub mod reconcile;
pub mod status;
