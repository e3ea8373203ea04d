//! Remote synchronization: snapshot reconciliation and the mutation outbox.

mod http;
mod meta;
mod outbox;
mod parser;
mod reconciler;
mod sink;
mod source;

pub(crate) use http::build_client;
pub use meta::{list_meta, load_meta, save_meta};
pub use outbox::{
    backoff, FlushSummary, Outbox, BACKOFF_BASE, BACKOFF_CAP, DEFAULT_FLUSH_LIMIT, DEFAULT_LEASE,
};
pub use parser::{JsonSnapshotParser, ParsedSnapshot, RejectedEntry, SnapshotParser};
pub use reconciler::{
    ReconcileOutcome, ReconcileStats, Reconciler, ReconcilerConfig, SkipReason,
    DEFAULT_REMOTE_ID_PREFIX, DEFAULT_THROTTLE_WINDOW, LISTINGS_JOB,
};
pub use sink::{HttpMutationSink, MutationSink, SinkRegistry};
pub use source::{HttpSnapshotSource, SnapshotSource, UnconfiguredSource};
