//! Startup context shared by clients.

use std::sync::Arc;

use super::SyncConfig;
use crate::clock::{Clock, SystemClock};

/// Operator switches read once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminOverrides {
    pub skip_onboarding: bool,
    pub force_onboarding: bool,
}

impl AdminOverrides {
    /// Whether onboarding should run given the user's recorded progress.
    pub const fn onboarding_required(self, completed: bool) -> bool {
        if self.force_onboarding {
            true
        } else if self.skip_onboarding {
            false
        } else {
            !completed
        }
    }
}

/// Validated configuration plus the clock, passed to services explicitly.
#[derive(Clone)]
pub struct AppContext {
    config: SyncConfig,
    overrides: AdminOverrides,
    clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let overrides = AdminOverrides {
            skip_onboarding: config.skip_onboarding,
            force_onboarding: config.force_onboarding,
        };
        Self {
            config,
            overrides,
            clock,
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn overrides(&self) -> AdminOverrides {
        self.overrides
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppContext")
            .field("config", &self.config)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}
