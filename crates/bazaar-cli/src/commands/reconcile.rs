use bazaar_core::sync::{ReconcileOutcome, SkipReason};
use bazaar_core::SyncService;

use crate::commands::common::format_timestamp;
use crate::error::CliError;

pub async fn run_reconcile(service: &SyncService, force: bool) -> Result<(), CliError> {
    let outcome = service.reconciler().reconcile(force).await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub fn describe_outcome(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Synced(stats) => format!(
            "Reconciled: {} upserted, {} deleted",
            stats.upserted, stats.deleted
        ),
        ReconcileOutcome::Partial(stats) => format!(
            "Reconciled with warnings: {} upserted, {} deleted, {} entries rejected",
            stats.upserted, stats.deleted, stats.rejected
        ),
        ReconcileOutcome::Skipped(SkipReason::Throttled { last_at }) => format!(
            "Skipped: last success at {} is inside the throttle window (use --force)",
            format_timestamp(*last_at)
        ),
        ReconcileOutcome::Skipped(SkipReason::NotConfigured(reason)) => {
            format!("Skipped: {reason}")
        }
        ReconcileOutcome::Error(message) => {
            format!("Reconcile failed, cached listings kept: {message}")
        }
    }
}
