use std::time::Duration;

use bazaar_core::SyncService;

use crate::error::CliError;

pub async fn run_cache_purge(service: &SyncService, max_age_secs: u64) -> Result<(), CliError> {
    let purged = service
        .cache()
        .purge_expired(Duration::from_secs(max_age_secs))
        .await?;
    println!("Purged {purged} expired cache entries");
    Ok(())
}
