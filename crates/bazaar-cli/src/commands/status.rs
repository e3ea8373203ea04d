use bazaar_core::{Clock, SyncService, SystemClock};

use crate::commands::common::format_meta_line;
use crate::error::CliError;

pub async fn run_status(service: &SyncService, as_json: bool) -> Result<(), CliError> {
    let report = service.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let now = SystemClock.now();
    if report.jobs.is_empty() {
        println!("No sync jobs have run yet.");
    }
    for (job, meta) in &report.jobs {
        println!("{}", format_meta_line(job, meta, now));
    }
    println!(
        "Outbox: {} pending, {} due",
        report.pending_mutations, report.due_mutations
    );
    println!("Listings cached: {}", report.listings);
    Ok(())
}
