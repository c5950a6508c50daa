use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

pub const DEBUG_ENV: &str = "WORKTIMER_DEBUG";

/// Timing policy of the session timer. Every field is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub tick_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Heartbeat gaps above this are restored as an implicit pause.
    pub short_gap_threshold_ms: u64,
    /// Heartbeat gaps above this close the session as aborted.
    pub stale_threshold_ms: u64,
    pub max_session_ms: u64,
    /// Extra slack on top of the tick interval before a late tick counts as sleep.
    pub sleep_tolerance_ms: u64,
    pub detect_sleep_by_tick: bool,
    pub abort_on_hidden: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            heartbeat_interval_ms: 60_000,
            short_gap_threshold_ms: 60_000,
            stale_threshold_ms: 60 * 60 * 1_000,
            max_session_ms: 8 * 60 * 60 * 1_000,
            sleep_tolerance_ms: 3_000,
            detect_sleep_by_tick: true,
            abort_on_hidden: true,
        }
    }
}

impl TimerConfig {
    /// Reads `path` if it exists, falling back to defaults, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read timer config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse timer config {}", path.display()))?
        } else {
            Self::default()
        };

        let debug_mode = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let config = config.with_debug(debug_mode);
        config.validate()?;
        Ok(config)
    }

    /// Debug mode heartbeats on every tick.
    pub fn with_debug(mut self, debug_mode: bool) -> Self {
        if debug_mode {
            self.heartbeat_interval_ms = self.tick_interval_ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 || self.heartbeat_interval_ms == 0 {
            bail!("tick and heartbeat intervals must be greater than zero");
        }
        if self.short_gap_threshold_ms > self.stale_threshold_ms {
            bail!(
                "short gap threshold ({} ms) exceeds stale threshold ({} ms)",
                self.short_gap_threshold_ms,
                self.stale_threshold_ms
            );
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Wall-clock delta between ticks beyond which the machine is assumed to have slept.
    pub fn sleep_overshoot_ms(&self) -> u64 {
        self.tick_interval_ms.saturating_add(self.sleep_tolerance_ms)
    }
}
