use bazaar_core::models::{ListingFilter, ListingId};
use bazaar_core::{Clock, SyncService, SystemClock};

use crate::cli::{SortArg, StatusArg};
use crate::commands::common::format_listing_lines;
use crate::error::CliError;

pub struct ListingQuery {
    pub status: Option<StatusArg>,
    pub prefix: Option<String>,
    pub search: Option<String>,
    pub sort: SortArg,
    pub limit: usize,
}

impl ListingQuery {
    pub fn into_filter(self) -> ListingFilter {
        let mut filter = ListingFilter::default()
            .sorted_by(self.sort.into())
            .with_limit(self.limit);
        if let Some(status) = self.status {
            filter = filter.with_status(status.into());
        }
        if let Some(prefix) = self.prefix.filter(|prefix| !prefix.trim().is_empty()) {
            filter = filter.with_id_prefix(prefix);
        }
        if let Some(search) = self.search.filter(|search| !search.trim().is_empty()) {
            filter = filter.with_text(search.trim());
        }
        filter
    }
}

pub async fn run_listings_list(
    service: &SyncService,
    query: ListingQuery,
    as_json: bool,
) -> Result<(), CliError> {
    let listings = service.store().list(&query.into_filter()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!("No listings cached.");
        return Ok(());
    }

    for line in format_listing_lines(&listings, SystemClock.now()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_listings_show(service: &SyncService, raw_id: &str) -> Result<(), CliError> {
    let id = raw_id
        .parse::<ListingId>()
        .map_err(|_| CliError::EmptyListingId)?;
    let listing = service
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| CliError::ListingNotFound(id.to_string()))?;

    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
