use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Horizon beyond which a one-shot timer is not armed directly (24 h).
pub const DEFAULT_MAX_DIRECT_DELAY_SECS: u64 = 24 * 60 * 60;
/// Cadence of the re-arm tick while deferred reminders exist (30 min).
pub const DEFAULT_REARM_INTERVAL_SECS: u64 = 30 * 60;
/// Trailing-edge window for batching near-simultaneous firings (250 ms).
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 250;

/// Engine tuning knobs (tickler.toml + TICKLER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicklerConfig {
    /// Reminders further out than this are deferred to the re-arm tick
    /// instead of holding a live timer (seconds).
    #[serde(default = "default_max_direct_delay_secs")]
    pub max_direct_delay_secs: u64,
    /// How often deferred reminders are re-examined (seconds).
    #[serde(default = "default_rearm_interval_secs")]
    pub rearm_interval_secs: u64,
    /// Debounce window collecting timer firings into one batch (milliseconds).
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

impl Default for TicklerConfig {
    fn default() -> Self {
        Self {
            max_direct_delay_secs: DEFAULT_MAX_DIRECT_DELAY_SECS,
            rearm_interval_secs: DEFAULT_REARM_INTERVAL_SECS,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
        }
    }
}

impl TicklerConfig {
    /// Load config from a TOML file with TICKLER_* env var overrides.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let config: TicklerConfig = figment
            .merge(Env::prefixed("TICKLER_"))
            .extract()
            .map_err(|e| crate::error::TicklerError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn max_direct_delay(&self) -> Duration {
        Duration::from_secs(self.max_direct_delay_secs)
    }

    pub fn rearm_interval(&self) -> Duration {
        Duration::from_secs(self.rearm_interval_secs)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

fn default_max_direct_delay_secs() -> u64 {
    DEFAULT_MAX_DIRECT_DELAY_SECS
}
fn default_rearm_interval_secs() -> u64 {
    DEFAULT_REARM_INTERVAL_SECS
}
fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW_MS
}
