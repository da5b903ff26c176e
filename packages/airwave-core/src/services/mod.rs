//! Domain services of the playback engine.
//!
//! This module provides:
//! - [`PlaybackSession`] the central orchestrator and its [`SessionHandle`]
//! - [`SleepTimer`] countdown with a pause side effect
//! - [`MetadataHistory`] bounded now-playing log
//! - [`CollectionSynchronizer`] persisted-store reconciliation

mod collection_sync;
mod metadata_history;
mod session;
mod sleep_timer;

pub use collection_sync::{CollectionChanged, CollectionSynchronizer};
pub use metadata_history::{sanitize_metadata, MetadataHistory};
pub use session::{CommandResponse, PlaybackSession, PlayerCommand, SessionHandle, SessionState};
pub use sleep_timer::SleepTimer;
