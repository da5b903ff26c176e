//! Engine configuration.
//!
//! All tunable parameters are threaded into the bootstrap explicitly instead
//! of being looked up from ambient global state. Defaults come from
//! [`crate::constants`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_RECONNECTION_COUNT, METADATA_HISTORY_SIZE, PLAYBACK_RESTART_MAX_ATTEMPTS,
    RECONNECTION_WAIT_INTERVAL, SLEEP_TIMER_DURATION, SLEEP_TIMER_INTERVAL,
};

/// Configuration for the sleep timer state machine.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SleepTimerConfig {
    /// Default countdown duration (milliseconds).
    pub duration_ms: u64,

    /// Tick interval (milliseconds).
    pub tick_interval_ms: u64,
}

impl Default for SleepTimerConfig {
    fn default() -> Self {
        Self {
            duration_ms: SLEEP_TIMER_DURATION.as_millis() as u64,
            tick_interval_ms: SLEEP_TIMER_INTERVAL.as_millis() as u64,
        }
    }
}

impl SleepTimerConfig {
    /// Returns the default countdown duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Returns the tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Configuration for transport-level stream reconnection.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of reconnection attempts for network I/O failures.
    pub max_reconnects: u32,

    /// Fixed wait between reconnection attempts (milliseconds).
    pub wait_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_reconnects: MAX_RECONNECTION_COUNT,
            wait_interval_ms: RECONNECTION_WAIT_INTERVAL.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    /// Returns the wait interval between attempts.
    #[must_use]
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

/// Configuration for the Airwave playback engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Sleep timer configuration.
    pub sleep_timer: SleepTimerConfig,

    /// Stream reconnection configuration.
    pub retry: RetryConfig,

    /// Number of whole-session restart attempts after a fatal player error.
    pub restart_max_attempts: u32,

    /// Number of entries kept in the metadata history.
    pub metadata_history_size: usize,

    /// Multiplier applied to the backend's stream buffer sizes.
    ///
    /// Larger buffers ride out longer network dropouts at the cost of a
    /// slower start. The persisted value, when present, overrides this.
    pub buffer_size_multiplier: u32,

    /// Queue the most recently played station on the first `prepare` after
    /// a cold start. `None` defers to the persisted `is_playing` value
    /// (resume only if the previous session was torn down mid-playback).
    #[serde(default)]
    pub resume_last_station: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sleep_timer: SleepTimerConfig::default(),
            retry: RetryConfig::default(),
            restart_max_attempts: PLAYBACK_RESTART_MAX_ATTEMPTS,
            metadata_history_size: METADATA_HISTORY_SIZE,
            buffer_size_multiplier: 1,
            resume_last_station: None,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sleep_timer.duration_ms == 0 {
            return Err("sleep_timer.duration_ms must be >= 1".to_string());
        }
        if self.sleep_timer.tick_interval_ms == 0 {
            return Err("sleep_timer.tick_interval_ms must be >= 1".to_string());
        }
        if self.retry.wait_interval_ms == 0 {
            return Err("retry.wait_interval_ms must be >= 1".to_string());
        }
        if self.metadata_history_size == 0 {
            return Err("metadata_history_size must be >= 1".to_string());
        }
        if self.buffer_size_multiplier == 0 {
            return Err("buffer_size_multiplier must be >= 1".to_string());
        }
        Ok(())
    }
}
