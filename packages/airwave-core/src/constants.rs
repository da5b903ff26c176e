//! Fixed engine constants.
//!
//! These values define the engine's timing and protocol behavior. Tunable
//! parameters live in [`crate::config::EngineConfig`]; the values here are
//! either protocol identifiers or defaults that the configuration layer
//! starts from.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Sleep Timer
// ─────────────────────────────────────────────────────────────────────────────

/// Default sleep timer duration (15 minutes).
pub const SLEEP_TIMER_DURATION: Duration = Duration::from_millis(900_000);

/// Interval between sleep timer ticks.
pub const SLEEP_TIMER_INTERVAL: Duration = Duration::from_millis(1_000);

/// Delay before clearing timer state after a pause-triggered cancel.
///
/// Gives observers reading "time remaining" a chance to render the pause
/// before the displayed value jumps to zero.
pub const SLEEP_TIMER_DELAYED_RESET: Duration = Duration::from_millis(2_500);

// ─────────────────────────────────────────────────────────────────────────────
// Stream Reconnection
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of transport-level reconnection attempts.
pub const MAX_RECONNECTION_COUNT: u32 = 20;

/// Wait interval between reconnection attempts.
///
/// Radio streams reconnect quickly or not at all; a fixed short interval
/// minimizes perceived silence while the attempt cap bounds retry storms.
pub const RECONNECTION_WAIT_INTERVAL: Duration = Duration::from_millis(5_000);

/// Maximum number of whole-session playback restarts after a fatal player
/// error. The attempt after this one stops the session outright.
pub const PLAYBACK_RESTART_MAX_ATTEMPTS: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Number of entries kept in the metadata history.
pub const METADATA_HISTORY_SIZE: usize = 20;

/// Maximum length of a single metadata entry (characters).
pub const METADATA_ENTRY_MAX_LENGTH: usize = 127;

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Stops the backend player and dismisses the now-playing surface.
pub const CMD_CANCEL_NOTIFICATION: &str = "CANCEL_NOTIFICATION";

/// Starts the sleep timer with the default duration.
pub const CMD_START_SLEEP_TIMER: &str = "START_SLEEP_TIMER";

/// Cancels a running sleep timer immediately.
pub const CMD_CANCEL_SLEEP_TIMER: &str = "CANCEL_SLEEP_TIMER";

/// Queries whether the sleep timer is running.
pub const CMD_REQUEST_SLEEP_TIMER_RUNNING: &str = "REQUEST_SLEEP_TIMER_RUNNING";

/// Queries the remaining sleep timer duration in milliseconds.
pub const CMD_REQUEST_SLEEP_TIMER_REMAINING: &str = "REQUEST_SLEEP_TIMER_REMAINING";

/// Queries the metadata history (oldest first).
pub const CMD_REQUEST_METADATA_HISTORY: &str = "REQUEST_METADATA_HISTORY";

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the player event broadcast channel.
pub const PLAYER_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the session command channel.
pub const SESSION_COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the collection changed-notification channel.
pub const COLLECTION_NOTIFICATION_CAPACITY: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in protocol data (User-Agent, health endpoint).
pub const APP_NAME: &str = "Airwave";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "airwave";

/// User-Agent sent by the ICY stream backend.
pub const USER_AGENT: &str = concat!("airwave/", env!("CARGO_PKG_VERSION"));
