use bazaar_core::SyncService;

use crate::error::CliError;

pub async fn run_flush(
    service: &SyncService,
    limit: Option<usize>,
    default_limit: usize,
) -> Result<(), CliError> {
    let summary = service
        .outbox()
        .flush(limit.unwrap_or(default_limit))
        .await?;

    if summary.processed == 0 {
        println!("Nothing due in the outbox.");
    } else {
        println!(
            "Flushed {} items: {} delivered, {} rescheduled",
            summary.processed, summary.succeeded, summary.failed
        );
    }
    Ok(())
}
