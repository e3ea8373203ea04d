use std::env;
use std::path::{Path, PathBuf};

use bazaar_core::db::Database;
use bazaar_core::models::{Listing, OutboxItem, OutboxItemId, SyncMeta};
use bazaar_core::{AppContext, SyncConfig, SyncService};
use chrono::{DateTime, Utc};

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("BAZAAR_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("bazaar").join("bazaar.db"))
        .ok_or(CliError::NoDataDir)
}

/// Explicit path, then `BAZAAR_CONFIG`, then the platform config directory.
pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Option<PathBuf> {
    cli_config
        .or_else(|| env::var_os("BAZAAR_CONFIG").map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|dir| dir.join("bazaar").join("config.json")))
}

/// Load the config file (if any), overlay the environment and validate.
pub fn load_context(config_path: Option<&Path>) -> Result<AppContext, CliError> {
    let mut config = match config_path {
        Some(path) => SyncConfig::load_from_path(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env()?;
    let config = config.validate()?;
    tracing::debug!("Loaded sync config: {config:?}");
    Ok(AppContext::new(config))
}

pub fn open_service(db_path: &Path, context: &AppContext) -> Result<SyncService, CliError> {
    let db = Database::open(db_path)?.into_shared();
    Ok(SyncService::from_context(db, context)?)
}

pub fn parse_outbox_id(raw: &str) -> Result<OutboxItemId, CliError> {
    raw.parse::<OutboxItemId>()
        .map_err(|_| CliError::InvalidOutboxId(raw.trim().to_string()))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_milliseconds();
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < 0 {
        let ahead = -diff;
        if ahead < minute {
            "in <1m".to_string()
        } else if ahead < hour {
            format!("in {}m", ahead / minute)
        } else if ahead < day {
            format!("in {}h", ahead / hour)
        } else {
            format!("in {}d", ahead / day)
        }
    } else if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn format_price(price_cents: Option<i64>, currency: Option<&str>) -> String {
    let Some(cents) = price_cents else {
        return "-".to_string();
    };
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let amount = format!("{sign}{}.{:02}", cents / 100, cents % 100);
    match currency {
        Some(code) => format!("{amount} {code}"),
        None => amount,
    }
}

pub fn format_listing_lines(listings: &[Listing], now: DateTime<Utc>) -> Vec<String> {
    listings
        .iter()
        .map(|listing| {
            format!(
                "{}  [{}]  {}  {}  ({})",
                listing.id,
                listing.status,
                listing.title,
                format_price(listing.price_cents, listing.currency.as_deref()),
                format_relative_time(listing.updated_at, now)
            )
        })
        .collect()
}

pub fn format_outbox_lines(items: &[OutboxItem], now: DateTime<Utc>) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let schedule = match item.next_attempt_at {
                Some(at) if !item.is_due(now) => format!("retry {}", format_relative_time(at, now)),
                _ => "due".to_string(),
            };
            let mut line = format!(
                "{}  {}  attempts={}  {}",
                item.id, item.kind, item.attempts, schedule
            );
            if item.leased_until.is_some_and(|until| until > now) {
                line.push_str("  (in flight)");
            }
            if let Some(error) = item.last_error.as_deref() {
                line.push_str(&format!("  last error: {error}"));
            }
            line
        })
        .collect()
}

pub fn format_meta_line(job: &str, meta: &SyncMeta, now: DateTime<Utc>) -> String {
    let mut line = format!("{job}: {}", meta.status);
    if let Some(at) = meta.last_at {
        line.push_str(&format!(
            ", last success {} ({})",
            format_timestamp(at),
            format_relative_time(at, now)
        ));
    }
    if let Some(count) = meta.last_count {
        line.push_str(&format!(", {count} records"));
    }
    if let Some(error) = meta.last_error.as_deref() {
        line.push_str(&format!(", note: {error}"));
    }
    line
}
