//! Playback backend abstraction.
//!
//! This module provides:
//! - [`BackendPlayer`] capability trait implemented by concrete backends
//! - [`SwappablePlayer`] stable handle that hot-swaps backends at runtime
//! - [`RetryPolicy`] transport-level reconnect decisions
//! - [`IcyStreamBackend`] reference backend for plain HTTP/ICY streams

mod icy;
mod retry;
mod swappable;

pub use icy::IcyStreamBackend;
pub use retry::{LoadErrorKind, RetryDecision, RetryPolicy};
pub use swappable::SwappablePlayer;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use async_trait::async_trait;

/// Errors reported by playback backends.
#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    /// Network failure while loading stream data.
    #[error("Network error: {0}")]
    Network(String),

    /// Stream content could not be decoded or is unsupported.
    #[error("Unsupported stream: {0}")]
    UnsupportedStream(String),

    /// No item is queued for playback.
    #[error("No item queued")]
    NothingQueued,

    /// The backend is gone (remote receiver disconnected, task ended).
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Convenient Result alias for backend operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Which kind of backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerBackendKind {
    /// In-process decoder playing on this machine.
    Local,
    /// Remote cast receiver controlled over the network.
    Remote,
}

impl std::fmt::Display for PlayerBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One queued playable item.
///
/// Items are derived from stations; `fallback_title` is shown whenever the
/// stream carries no inline metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerItem {
    /// Id of the station this item was built from.
    pub station_id: String,
    /// Display title.
    pub title: String,
    /// Stream URI to play.
    pub stream_uri: String,
    /// Title to fall back to when the stream has no metadata.
    pub fallback_title: String,
}

impl PlayerItem {
    /// Builds an item from a station, using the station name as both title
    /// and metadata fallback.
    #[must_use]
    pub fn from_station(station: &crate::station::Station) -> Option<Self> {
        let stream_uri = station.stream_uri()?.to_string();
        Some(Self {
            station_id: station.id.clone(),
            title: station.name.clone(),
            stream_uri,
            fallback_title: station.name.clone(),
        })
    }
}

/// Why `play_when_ready` changed without an explicit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayWhenReadyReason {
    /// A user-issued play or pause request.
    UserRequest,
    /// An audio-focus style interruption on the backend's side.
    Interruption,
    /// The remote receiver changed state on its own.
    Remote,
}

/// Events emitted by a backend player.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The backend started or stopped producing audio.
    IsPlayingChanged {
        /// New playing state.
        is_playing: bool,
    },

    /// The play intent changed, possibly without a state change yet.
    PlayWhenReadyChanged {
        /// New intent.
        play_when_ready: bool,
        /// Why it changed.
        reason: PlayWhenReadyReason,
    },

    /// The backend hit a fatal error and stopped.
    Error {
        /// The error.
        error: PlayerError,
    },

    /// The stream delivered a new raw metadata string.
    MetadataChanged {
        /// Raw, undecoded metadata text.
        raw: String,
    },
}

/// Capability interface for a streaming-audio playback backend.
///
/// Implementations wrap either an in-process decoder or a remote cast
/// receiver. All operations are best-effort commands; the authoritative
/// state arrives through the event stream returned by [`subscribe`].
///
/// [`subscribe`]: BackendPlayer::subscribe
#[async_trait]
pub trait BackendPlayer: Send + Sync {
    /// Which kind of backend this is.
    fn kind(&self) -> PlayerBackendKind;

    /// Starts or resumes playback of the current item.
    async fn play(&self) -> PlayerResult<()>;

    /// Pauses playback.
    async fn pause(&self) -> PlayerResult<()>;

    /// Stops playback and releases stream resources.
    async fn stop(&self) -> PlayerResult<()>;

    /// Jumps to the live edge of the stream.
    ///
    /// Radio streams are continuous; resuming from a stale buffered
    /// position is wrong, so the session seeks here before resuming.
    async fn seek_to_live(&self) -> PlayerResult<()>;

    /// Replaces the queue with the given items and selects `start_index`.
    async fn set_items(&self, items: Vec<PlayerItem>, start_index: usize) -> PlayerResult<()>;

    /// Returns the currently selected item, if any.
    fn current_item(&self) -> Option<PlayerItem>;

    /// Returns the index of the currently selected item, if any.
    fn current_index(&self) -> Option<usize>;

    /// Whether the backend is currently producing audio.
    fn is_playing(&self) -> bool;

    /// Subscribes to the backend's event stream.
    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;
}
