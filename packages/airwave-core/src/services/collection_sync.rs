//! In-memory collection kept in sync with the persisted store.
//!
//! Station edits happen in the external collaborator that owns the
//! persisted copy; this core learns about them through changed
//! notifications carrying a modification timestamp. A notification with a
//! timestamp at or below the last known one is a no-op, which both
//! de-duplicates out-of-order notifications and prevents this core's own
//! playback-state writes from triggering a reload loop.

use crate::station::Collection;
use crate::storage::{StateStore, StorageResult};

/// Notification that the persisted collection changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionChanged {
    /// Modification timestamp of the persisted copy, Unix millis.
    pub modification_millis: u64,
}

/// Owns the in-memory station collection.
///
/// Confined to the session owner task; reload is the only path that
/// replaces the collection wholesale.
pub struct CollectionSynchronizer {
    collection: Collection,
    last_known_modification: u64,
}

impl CollectionSynchronizer {
    /// Creates a synchronizer seeded with an already-loaded collection.
    #[must_use]
    pub fn new(collection: Collection) -> Self {
        let last_known_modification = collection.modification_millis;
        Self {
            collection,
            last_known_modification,
        }
    }

    /// The current in-memory collection.
    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Last modification timestamp this synchronizer has seen.
    #[must_use]
    pub fn last_known_modification(&self) -> u64 {
        self.last_known_modification
    }

    /// Sets the `is_playing` display flag inside the cached collection.
    ///
    /// Playback-state writes deliberately leave `modification_millis`
    /// untouched so they never look like station edits.
    pub fn mark_playing(&mut self, station_id: Option<&str>, is_playing: bool) {
        self.collection.mark_playing(station_id, is_playing);
    }

    /// Handles a changed notification, reloading from the store when the
    /// timestamp is strictly newer than the last known one.
    ///
    /// Returns true if a reload happened.
    pub async fn handle_notification(
        &mut self,
        notification: CollectionChanged,
        store: &dyn StateStore,
    ) -> StorageResult<bool> {
        if notification.modification_millis <= self.last_known_modification {
            log::debug!(
                "[CollectionSync] Ignoring stale notification ({} <= {})",
                notification.modification_millis,
                self.last_known_modification
            );
            return Ok(false);
        }
        self.reload(store).await?;
        self.last_known_modification = notification.modification_millis;
        Ok(true)
    }

    /// Reloads the collection from the store unconditionally.
    ///
    /// `last_known_modification` is deliberately not advanced here: it only
    /// moves through [`handle_notification`], so a reconciliation reload
    /// that happens to observe a fresh edit does not mark the edit's own
    /// pending notification as stale.
    ///
    /// [`handle_notification`]: CollectionSynchronizer::handle_notification
    pub async fn reload(&mut self, store: &dyn StateStore) -> StorageResult<()> {
        self.collection = store.load_collection().await?;
        log::info!(
            "[CollectionSync] Reloaded collection ({} stations, modified {})",
            self.collection.len(),
            self.collection.modification_millis
        );
        Ok(())
    }
}
