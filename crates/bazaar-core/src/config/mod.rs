//! Runtime configuration for sync clients.
//!
//! `SyncConfig` is read from an optional JSON file, overlaid by `BAZAAR_*`
//! environment variables and validated once at startup. The result is handed
//! to [`AppContext`] and passed explicitly to whatever needs it.

mod context;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{DEFAULT_FLUSH_LIMIT, DEFAULT_LEASE, DEFAULT_REMOTE_ID_PREFIX, DEFAULT_THROTTLE_WINDOW};
use crate::util::{is_http_url, normalize_text_option};

pub use context::{AdminOverrides, AppContext};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 300;

const HOUR_SECS: u64 = 60 * 60;
const MAX_LEASE_SECS: u64 = 24 * HOUR_SECS;
const MAX_THROTTLE_WINDOW_SECS: u64 = 30 * 24 * HOUR_SECS;
const MAX_HTTP_TIMEOUT_SECS: u64 = HOUR_SECS;
const MAX_TICK_INTERVAL_SECS: u64 = 24 * HOUR_SECS;

/// Endpoints and tuning for the sync core.
///
/// Tokens are secrets; `Debug` redacts them.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub snapshot_url: Option<String>,
    pub snapshot_token: Option<String>,
    pub mutation_base_url: Option<String>,
    pub mutation_token: Option<String>,
    pub remote_id_prefix: String,
    pub throttle_window_secs: u64,
    pub flush_batch_limit: usize,
    pub lease_secs: u64,
    pub http_timeout_secs: u64,
    pub tick_interval_secs: u64,
    pub skip_onboarding: bool,
    pub force_onboarding: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_url: None,
            snapshot_token: None,
            mutation_base_url: None,
            mutation_token: None,
            remote_id_prefix: DEFAULT_REMOTE_ID_PREFIX.to_string(),
            throttle_window_secs: DEFAULT_THROTTLE_WINDOW.as_secs(),
            flush_batch_limit: DEFAULT_FLUSH_LIMIT,
            lease_secs: DEFAULT_LEASE.as_secs(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            skip_onboarding: false,
            force_onboarding: false,
        }
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("snapshot_url", &self.snapshot_url)
            .field("snapshot_token", &self.snapshot_token.as_ref().map(|_| "[REDACTED]"))
            .field("mutation_base_url", &self.mutation_base_url)
            .field("mutation_token", &self.mutation_token.as_ref().map(|_| "[REDACTED]"))
            .field("remote_id_prefix", &self.remote_id_prefix)
            .field("throttle_window_secs", &self.throttle_window_secs)
            .field("flush_batch_limit", &self.flush_batch_limit)
            .field("lease_secs", &self.lease_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("tick_interval_secs", &self.tick_interval_secs)
            .field("skip_onboarding", &self.skip_onboarding)
            .field("force_onboarding", &self.force_onboarding)
            .finish()
    }
}

impl SyncConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse a JSON config document.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|error| Error::InvalidInput(format!("invalid config: {error}")))
    }

    /// Overlay `BAZAAR_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay `BAZAAR_*` variables resolved through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let text = |name: &str| normalize_text_option(lookup(name));

        if let Some(value) = text("BAZAAR_SNAPSHOT_URL") {
            self.snapshot_url = Some(value);
        }
        if let Some(value) = text("BAZAAR_SNAPSHOT_TOKEN") {
            self.snapshot_token = Some(value);
        }
        if let Some(value) = text("BAZAAR_MUTATION_BASE_URL") {
            self.mutation_base_url = Some(value);
        }
        if let Some(value) = text("BAZAAR_MUTATION_TOKEN") {
            self.mutation_token = Some(value);
        }
        if let Some(value) = text("BAZAAR_REMOTE_ID_PREFIX") {
            self.remote_id_prefix = value;
        }
        if let Some(value) = text("BAZAAR_THROTTLE_WINDOW_SECS") {
            self.throttle_window_secs = parse_number("BAZAAR_THROTTLE_WINDOW_SECS", &value)?;
        }
        if let Some(value) = text("BAZAAR_FLUSH_BATCH_LIMIT") {
            self.flush_batch_limit = parse_number("BAZAAR_FLUSH_BATCH_LIMIT", &value)?;
        }
        if let Some(value) = text("BAZAAR_LEASE_SECS") {
            self.lease_secs = parse_number("BAZAAR_LEASE_SECS", &value)?;
        }
        if let Some(value) = text("BAZAAR_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_number("BAZAAR_HTTP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = text("BAZAAR_TICK_INTERVAL_SECS") {
            self.tick_interval_secs = parse_number("BAZAAR_TICK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = text("BAZAAR_SKIP_ONBOARDING") {
            self.skip_onboarding = parse_flag("BAZAAR_SKIP_ONBOARDING", &value)?;
        }
        if let Some(value) = text("BAZAAR_FORCE_ONBOARDING") {
            self.force_onboarding = parse_flag("BAZAAR_FORCE_ONBOARDING", &value)?;
        }
        Ok(())
    }

    /// Normalize text fields and reject values the sync core cannot run with.
    pub fn validate(mut self) -> Result<Self> {
        self.snapshot_url = normalize_url(self.snapshot_url, "snapshot_url")?;
        self.mutation_base_url = normalize_url(self.mutation_base_url, "mutation_base_url")?;
        self.snapshot_token = normalize_text_option(self.snapshot_token);
        self.mutation_token = normalize_text_option(self.mutation_token);
        self.remote_id_prefix = self.remote_id_prefix.trim().to_string();

        if self.remote_id_prefix.is_empty() {
            return Err(Error::InvalidInput(
                "remote_id_prefix must not be empty".to_string(),
            ));
        }
        if self.flush_batch_limit == 0 {
            return Err(Error::InvalidInput(
                "flush_batch_limit must be greater than zero".to_string(),
            ));
        }
        for (field, value, max) in [
            ("lease_secs", self.lease_secs, MAX_LEASE_SECS),
            ("http_timeout_secs", self.http_timeout_secs, MAX_HTTP_TIMEOUT_SECS),
            ("tick_interval_secs", self.tick_interval_secs, MAX_TICK_INTERVAL_SECS),
        ] {
            if value == 0 {
                return Err(Error::InvalidInput(format!("{field} must be greater than zero")));
            }
            if value > max {
                return Err(Error::InvalidInput(format!("{field} must be at most {max}")));
            }
        }
        // Zero disables throttling.
        if self.throttle_window_secs > MAX_THROTTLE_WINDOW_SECS {
            return Err(Error::InvalidInput(format!(
                "throttle_window_secs must be at most {MAX_THROTTLE_WINDOW_SECS}"
            )));
        }
        if self.skip_onboarding && self.force_onboarding {
            return Err(Error::InvalidInput(
                "skip_onboarding and force_onboarding are mutually exclusive".to_string(),
            ));
        }
        Ok(self)
    }

    pub const fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_window_secs)
    }

    pub const fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

fn normalize_url(raw: Option<String>, field: &str) -> Result<Option<String>> {
    let Some(value) = normalize_text_option(raw) else {
        return Ok(None);
    };
    if is_http_url(&value) {
        Ok(Some(value.trim_end_matches('/').to_string()))
    } else {
        Err(Error::InvalidInput(format!(
            "{field} must include http:// or https://"
        )))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{name} must be a non-negative integer")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!("{name} must be a boolean"))),
    }
}
