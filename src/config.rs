//! Engine configuration
//!
//! Environment variable handling with parse-and-fallback defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Grace period between staging an edit and committing it.
    /// The undo window and the toast lifetime are exactly this long.
    pub grace_period: Duration,
    /// Look-ahead horizon for the ledger's "coming up" classification, in days
    pub coming_up_horizon_days: i64,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    /// Directory for the best-effort local cache mirror (None = in-memory only)
    pub local_cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(2500),
            coming_up_horizon_days: 7,
            event_capacity: 256,
            local_cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment or defaults
    pub fn from_env() -> Self {
        let grace_ms = std::env::var("GRACE_PERIOD_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2500);

        let horizon_days = std::env::var("COMING_UP_HORIZON_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        let event_capacity = std::env::var("EVENT_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256);

        let local_cache_dir = std::env::var("LOCAL_CACHE_DIR").ok().map(PathBuf::from);

        Self {
            grace_period: Duration::from_millis(grace_ms),
            coming_up_horizon_days: horizon_days,
            event_capacity,
            local_cache_dir,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.grace_period.is_zero() {
            return Err("grace period must be greater than zero".to_string());
        }
        if self.coming_up_horizon_days < 0 {
            return Err("coming-up horizon must not be negative".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}
