use bazaar_core::{Clock, SyncService, SystemClock};

use crate::commands::common::{format_outbox_lines, parse_outbox_id};
use crate::error::CliError;

pub async fn run_outbox_list(
    service: &SyncService,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let items = service.outbox().list(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for line in format_outbox_lines(&items, SystemClock.now()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_outbox_retry(service: &SyncService, raw_id: &str) -> Result<(), CliError> {
    let id = parse_outbox_id(raw_id)?;
    service.outbox().retry_now(&id).await?;
    println!("Outbox item {id} will be retried on the next flush");
    Ok(())
}

pub async fn run_outbox_drop(service: &SyncService, raw_id: &str) -> Result<(), CliError> {
    let id = parse_outbox_id(raw_id)?;
    service.outbox().drop_item(&id).await?;
    println!("Dropped outbox item {id}");
    Ok(())
}
