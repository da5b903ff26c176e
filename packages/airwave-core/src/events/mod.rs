//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for channel-based transport
//! - The [`SessionEvent`] type describing playback session changes

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, NoopEventEmitter};

use serde::Serialize;

/// Events broadcast to clients observing the playback session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Playback started or stopped.
    PlaybackChanged {
        /// Whether the backend is now playing.
        #[serde(rename = "isPlaying")]
        is_playing: bool,
        /// Id of the current station, if any.
        #[serde(rename = "stationId", skip_serializing_if = "Option::is_none")]
        station_id: Option<String>,
        /// Index of the current station in playback order.
        #[serde(rename = "stationIndex", skip_serializing_if = "Option::is_none")]
        station_index: Option<usize>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// A new now-playing metadata entry was recorded.
    MetadataUpdated {
        /// The decoded metadata entry.
        entry: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// The sleep timer state changed (started, ticked down, or cleared).
    SleepTimerChanged {
        /// Whether the timer is running.
        running: bool,
        /// Remaining time in milliseconds.
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// A playback restart was scheduled after a player error.
    RestartScheduled {
        /// The restart attempt number (1-based).
        attempt: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// Playback could not be restored; the session stopped the backend.
    ///
    /// This is the one-shot terminal failure surfaced for user-visible
    /// reporting.
    RestartExhausted {
        /// Id of the station that failed, if known.
        #[serde(rename = "stationId", skip_serializing_if = "Option::is_none")]
        station_id: Option<String>,
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// The station collection was reloaded from the persisted store.
    CollectionReloaded {
        /// Number of stations after the reload.
        #[serde(rename = "stationCount")]
        station_count: usize,
        /// Modification timestamp of the reloaded collection, Unix millis.
        #[serde(rename = "modificationMillis")]
        modification_millis: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// The active playback backend was swapped.
    BackendChanged {
        /// Kind of the now-active backend (`local` or `remote`).
        backend: crate::player::PlayerBackendKind,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}
