//! Persisted-state read/write contract.
//!
//! The engine treats the external store as a small key/value store for
//! playback preferences plus a document store for the station collection.
//! The exact on-disk format belongs to the external collaborator; this
//! module defines the [`StateStore`] trait and two implementations:
//! an in-memory store for tests and embedders that persist elsewhere, and
//! a JSON file store with atomic writes for the standalone server.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::station::Collection;

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenient Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Playback fields persisted across session teardowns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Whether playback was active.
    pub is_playing: bool,
    /// Index of the current station in playback order.
    pub current_station_index: Option<usize>,
    /// Id of the current station.
    pub current_station_id: Option<String>,
}

// Preference keys. The store is a key/value namespace; these are the only
// keys the engine reads or writes.
const KEY_PLAYBACK_STATE: &str = "playbackState";
const KEY_SLEEP_TIMER_RUNNING: &str = "sleepTimerRunning";
const KEY_METADATA_HISTORY: &str = "metadataHistory";
const KEY_BUFFER_SIZE_MULTIPLIER: &str = "bufferSizeMultiplier";

/// Read/write contract for persisted playback state and the collection.
///
/// Implementations may suspend while I/O completes; the session orchestrator
/// awaits these calls on its owner task.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a preference value by key. `None` if never written.
    async fn read_value(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Writes a preference value by key.
    async fn write_value(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Loads the station collection document.
    async fn load_collection(&self) -> StorageResult<Collection>;

    /// Saves the station collection document.
    async fn save_collection(&self, collection: &Collection) -> StorageResult<()>;
}

/// Typed accessors over the key/value namespace.
///
/// Kept as extension methods so `StateStore` implementations only deal with
/// raw values.
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Loads the persisted playback state, defaulting to "not playing".
    async fn load_playback_state(&self) -> StorageResult<PlaybackState> {
        Ok(self
            .read_value(KEY_PLAYBACK_STATE)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    /// Saves the playback state.
    async fn save_playback_state(&self, state: &PlaybackState) -> StorageResult<()> {
        self.write_value(KEY_PLAYBACK_STATE, serde_json::to_value(state)?)
            .await
    }

    /// Loads the "sleep timer running" flag.
    async fn load_sleep_timer_running(&self) -> StorageResult<bool> {
        Ok(self
            .read_value(KEY_SLEEP_TIMER_RUNNING)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Saves the "sleep timer running" flag.
    async fn save_sleep_timer_running(&self, running: bool) -> StorageResult<()> {
        self.write_value(KEY_SLEEP_TIMER_RUNNING, Value::Bool(running))
            .await
    }

    /// Loads the metadata history (oldest first).
    async fn load_metadata_history(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .read_value(KEY_METADATA_HISTORY)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    /// Saves the metadata history (oldest first).
    async fn save_metadata_history(&self, history: &[String]) -> StorageResult<()> {
        self.write_value(KEY_METADATA_HISTORY, serde_json::to_value(history)?)
            .await
    }

    /// Loads the buffer size multiplier. `None` if never written; values
    /// below 1 are treated as unset.
    async fn load_buffer_size_multiplier(&self) -> StorageResult<Option<u32>> {
        Ok(self
            .read_value(KEY_BUFFER_SIZE_MULTIPLIER)
            .await?
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .filter(|v| *v >= 1))
    }
}

impl<T: StateStore + ?Sized> StateStoreExt for T {}

// ─────────────────────────────────────────────────────────────────────────────
// In-Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory [`StateStore`] for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStateStore {
    values: DashMap<String, Value>,
    collection: RwLock<Collection>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with a collection.
    #[must_use]
    pub fn with_collection(collection: Collection) -> Self {
        Self {
            values: DashMap::new(),
            collection: RwLock::new(collection),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_value(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn write_value(&self, key: &str, value: Value) -> StorageResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn load_collection(&self) -> StorageResult<Collection> {
        Ok(self.collection.read().clone())
    }

    async fn save_collection(&self, collection: &Collection) -> StorageResult<()> {
        *self.collection.write() = collection.clone();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON File Store
// ─────────────────────────────────────────────────────────────────────────────

const SETTINGS_FILE: &str = "settings.json";
const COLLECTION_FILE: &str = "collection.json";

/// JSON-file-backed [`StateStore`] for the standalone server.
///
/// Preferences live in `settings.json`, the collection in
/// `collection.json`. Writes go through a temp file plus rename to prevent
/// corruption on crash; a single lock serializes file operations.
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Creates a store rooted at the given data directory.
    ///
    /// The directory is created on first write, not here.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn read_json(&self, file: &str) -> StorageResult<Option<Value>> {
        let _guard = self.lock.lock();
        let path = self.dir.join(file);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json(&self, file: &str, value: &Value) -> StorageResult<()> {
        let _guard = self.lock.lock();
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        let temp_path = self.dir.join(format!("{file}.tmp"));
        let contents = serde_json::to_string_pretty(value)?;

        // Write to temp file first, then atomic rename (on most filesystems)
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read_value(&self, key: &str) -> StorageResult<Option<Value>> {
        let settings = self.read_json(SETTINGS_FILE)?;
        Ok(settings.and_then(|s| s.get(key).cloned()))
    }

    async fn write_value(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut settings = self
            .read_json(SETTINGS_FILE)?
            .unwrap_or_else(|| Value::Object(Default::default()));
        if let Some(map) = settings.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self.write_json(SETTINGS_FILE, &settings)
    }

    async fn load_collection(&self) -> StorageResult<Collection> {
        match self.read_json(COLLECTION_FILE)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Collection::default()),
        }
    }

    async fn save_collection(&self, collection: &Collection) -> StorageResult<()> {
        self.write_json(COLLECTION_FILE, &serde_json::to_value(collection)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;

    #[tokio::test]
    async fn memory_store_round_trips_playback_state() {
        let store = MemoryStateStore::new();
        assert_eq!(
            store.load_playback_state().await.unwrap(),
            PlaybackState::default()
        );

        let state = PlaybackState {
            is_playing: true,
            current_station_index: Some(2),
            current_station_id: Some("abc".into()),
        };
        store.save_playback_state(&state).await.unwrap();
        assert_eq!(store.load_playback_state().await.unwrap(), state);
    }

    #[tokio::test]
    async fn memory_store_defaults() {
        let store = MemoryStateStore::new();
        assert!(!store.load_sleep_timer_running().await.unwrap());
        assert!(store.load_metadata_history().await.unwrap().is_empty());
        assert_eq!(store.load_buffer_size_multiplier().await.unwrap(), None);
    }

    #[tokio::test]
    async fn buffer_multiplier_rejects_zero() {
        let store = MemoryStateStore::new();
        store
            .write_value(KEY_BUFFER_SIZE_MULTIPLIER, Value::from(0u32))
            .await
            .unwrap();
        assert_eq!(store.load_buffer_size_multiplier().await.unwrap(), None);

        store
            .write_value(KEY_BUFFER_SIZE_MULTIPLIER, Value::from(4u32))
            .await
            .unwrap();
        assert_eq!(store.load_buffer_size_multiplier().await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn json_store_round_trips_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.save_sleep_timer_running(true).await.unwrap();
        store
            .save_metadata_history(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(store.load_sleep_timer_running().await.unwrap());
        assert_eq!(
            store.load_metadata_history().await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        // settings land in one file
        assert!(dir.path().join(SETTINGS_FILE).exists());
        assert!(!dir.path().join(format!("{SETTINGS_FILE}.tmp")).exists());
    }

    #[tokio::test]
    async fn json_store_round_trips_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.load_collection().await.unwrap().is_empty());

        let collection = Collection::new(vec![Station::new("FM4", "http://radio.example/fm4")]);
        store.save_collection(&collection).await.unwrap();

        let loaded = store.load_collection().await.unwrap();
        assert_eq!(loaded, collection);
    }
}
