//! Playback session orchestrator.
//!
//! The session is the central state machine of the engine. It owns the
//! [`SwappablePlayer`], wires the sleep timer and restart counter into it,
//! maintains the metadata history and the synchronized collection, and
//! serves the command/response protocol to remote controllers.
//!
//! All session state lives on a single owner task. Player events,
//! collection notifications and commands arrive over channels and are
//! handled one at a time; command replies travel back over oneshot
//! channels.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::constants::{
    CMD_CANCEL_NOTIFICATION, CMD_CANCEL_SLEEP_TIMER, CMD_REQUEST_METADATA_HISTORY,
    CMD_REQUEST_SLEEP_TIMER_REMAINING, CMD_REQUEST_SLEEP_TIMER_RUNNING, CMD_START_SLEEP_TIMER,
    SESSION_COMMAND_CHANNEL_CAPACITY,
};
use crate::error::{AirwaveError, AirwaveResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::player::{
    BackendPlayer, PlayerBackendKind, PlayerEvent, PlayerItem, SwappablePlayer,
};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{
    sanitize_metadata, CollectionChanged, CollectionSynchronizer, MetadataHistory, SleepTimer,
};
use crate::storage::{PlaybackState, StateStore, StateStoreExt};
use crate::utils::now_millis;

/// Player-level commands that pass through the session's command gate
/// before reaching the backend.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// Prepare the queue for playback without starting it.
    Prepare,
    /// Toggle playback. Starting playback always resumes at the live edge.
    PlayPause,
    /// Start playback, optionally switching to a specific station first.
    Play {
        /// Station to switch to; `None` keeps the current selection.
        station_id: Option<String>,
    },
    /// Pause playback.
    Pause,
    /// Stop playback and release stream resources.
    Stop,
}

/// Response payload of a session command.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandResponse {
    /// The command succeeded and carries no payload.
    Ack,
    /// Sleep timer running state.
    SleepTimerRunning {
        /// Whether the timer is running.
        running: bool,
    },
    /// Remaining sleep timer duration.
    SleepTimerRemaining {
        /// Remaining time in milliseconds.
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
    },
    /// Metadata history, oldest first.
    MetadataHistory {
        /// The entries.
        history: Vec<String>,
    },
}

/// Snapshot of the session's observable state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Whether the backend is producing audio.
    pub is_playing: bool,
    /// Id of the current station, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_station_id: Option<String>,
    /// Index of the current station in playback order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_station_index: Option<usize>,
    /// Kind of the active backend, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<PlayerBackendKind>,
    /// Whether the sleep timer is running.
    pub sleep_timer_running: bool,
    /// Remaining sleep timer duration in milliseconds.
    pub sleep_timer_remaining_ms: u64,
    /// Metadata history, oldest first.
    pub metadata_history: Vec<String>,
    /// Number of stations in the collection.
    pub station_count: usize,
    /// Modification timestamp of the collection, Unix millis.
    pub collection_modification_millis: u64,
    /// Multiplier applied to backend stream buffer sizes.
    pub buffer_size_multiplier: u32,
}

enum SessionRequest {
    Command {
        id: String,
        reply: oneshot::Sender<AirwaveResult<CommandResponse>>,
    },
    Player {
        command: PlayerCommand,
        reply: oneshot::Sender<AirwaveResult<()>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    SetBackend {
        backend: Arc<dyn BackendPlayer>,
    },
}

/// Cloneable handle for talking to the session owner task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// Executes a protocol command by its string identifier.
    pub async fn execute(&self, command_id: &str) -> AirwaveResult<CommandResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Command {
                id: command_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| AirwaveError::SessionClosed)?;
        reply_rx.await.map_err(|_| AirwaveError::SessionClosed)?
    }

    /// Issues a gated player command.
    pub async fn player_command(&self, command: PlayerCommand) -> AirwaveResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Player {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AirwaveError::SessionClosed)?;
        reply_rx.await.map_err(|_| AirwaveError::SessionClosed)?
    }

    /// Returns a snapshot of the session state.
    pub async fn state(&self) -> AirwaveResult<SessionState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::State { reply: reply_tx })
            .await
            .map_err(|_| AirwaveError::SessionClosed)?;
        reply_rx.await.map_err(|_| AirwaveError::SessionClosed)
    }

    /// Swaps the active playback backend.
    pub async fn set_backend(&self, backend: Arc<dyn BackendPlayer>) -> AirwaveResult<()> {
        self.tx
            .send(SessionRequest::SetBackend { backend })
            .await
            .map_err(|_| AirwaveError::SessionClosed)
    }
}

/// The orchestrator. Constructed and consumed by [`PlaybackSession::start`];
/// lives on its owner task afterwards.
pub struct PlaybackSession {
    config: EngineConfig,
    player: Arc<SwappablePlayer>,
    store: Arc<dyn StateStore>,
    emitter: Arc<dyn EventEmitter>,
    sleep_timer: SleepTimer,
    metadata_history: MetadataHistory,
    collection: CollectionSynchronizer,
    restart_attempts: u32,
    resume_on_prepare: bool,
    buffer_size_multiplier: u32,
    last_played: PlaybackState,
}

impl PlaybackSession {
    /// Initializes session state from the store and spawns the owner task.
    ///
    /// Loads the collection, metadata history, buffer multiplier and
    /// last-played position, seeds the backend queue, and arms the one-shot
    /// resume flag when the previous session was torn down while playing.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        config: EngineConfig,
        player: Arc<SwappablePlayer>,
        store: Arc<dyn StateStore>,
        emitter: Arc<dyn EventEmitter>,
        collection_rx: broadcast::Receiver<CollectionChanged>,
        spawner: TokioSpawner,
        cancel: CancellationToken,
    ) -> AirwaveResult<SessionHandle> {
        config.validate().map_err(AirwaveError::Configuration)?;

        let collection = CollectionSynchronizer::new(store.load_collection().await?);
        let metadata_history = MetadataHistory::from_entries(
            store.load_metadata_history().await?,
            config.metadata_history_size,
        );
        let last_played = store.load_playback_state().await?;
        let buffer_size_multiplier = store
            .load_buffer_size_multiplier()
            .await?
            .unwrap_or(config.buffer_size_multiplier);
        let resume_on_prepare = config
            .resume_last_station
            .unwrap_or(last_played.is_playing);

        let (sleep_timer, expiry_rx) = SleepTimer::new(
            config.sleep_timer.clone(),
            Arc::clone(&emitter),
            Arc::clone(&store),
            spawner.clone(),
        );

        let mut session = Self {
            config,
            player,
            store,
            emitter,
            sleep_timer,
            metadata_history,
            collection,
            restart_attempts: 0,
            resume_on_prepare,
            buffer_size_multiplier,
            last_played,
        };

        log::info!(
            "[Session] Starting ({} stations, resume={}, buffer x{})",
            session.collection.collection().len(),
            session.resume_on_prepare,
            session.buffer_size_multiplier
        );
        session.rebuild_queue().await;

        let (request_tx, request_rx) = mpsc::channel(SESSION_COMMAND_CHANNEL_CAPACITY);
        let player_events = session.player.subscribe();
        spawner.spawn(session.run(request_rx, player_events, collection_rx, expiry_rx, cancel));

        Ok(SessionHandle { tx: request_tx })
    }

    async fn run(
        mut self,
        mut request_rx: mpsc::Receiver<SessionRequest>,
        mut player_events: broadcast::Receiver<PlayerEvent>,
        mut collection_rx: broadcast::Receiver<CollectionChanged>,
        mut expiry_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                request = request_rx.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },

                event = player_events.recv() => match event {
                    Ok(event) => self.handle_player_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[Session] Player events lagged, skipped {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                notification = collection_rx.recv() => match notification {
                    Ok(notification) => self.handle_collection_notification(notification).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[Session] Collection notifications lagged, skipped {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                Some(()) = expiry_rx.recv() => {
                    log::info!("[Session] Sleep timer expired, pausing playback");
                    if let Err(e) = self.player.pause().await {
                        log::warn!("[Session] Pause after sleep timer failed: {e}");
                    }
                }
            }
        }
        log::info!("[Session] Owner task ended");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────

    async fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Command { id, reply } => {
                let result = self.execute_command(&id).await;
                let _ = reply.send(result);
            }
            SessionRequest::Player { command, reply } => {
                let result = self.execute_player_command(command).await;
                let _ = reply.send(result);
            }
            SessionRequest::State { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionRequest::SetBackend { backend } => {
                let kind = backend.kind();
                self.player.set_backend(backend);
                self.rebuild_queue().await;
                self.emitter.emit_session(SessionEvent::BackendChanged {
                    backend: kind,
                    timestamp: now_millis(),
                });
            }
        }
    }

    async fn execute_command(&mut self, id: &str) -> AirwaveResult<CommandResponse> {
        log::debug!("[Session] Command: {id}");
        match id {
            CMD_CANCEL_NOTIFICATION => {
                self.player.stop().await?;
                Ok(CommandResponse::Ack)
            }
            CMD_START_SLEEP_TIMER => {
                self.sleep_timer.start(false);
                Ok(CommandResponse::Ack)
            }
            CMD_CANCEL_SLEEP_TIMER => {
                self.sleep_timer.cancel(false);
                Ok(CommandResponse::Ack)
            }
            CMD_REQUEST_SLEEP_TIMER_RUNNING => Ok(CommandResponse::SleepTimerRunning {
                running: self.sleep_timer.is_running(),
            }),
            CMD_REQUEST_SLEEP_TIMER_REMAINING => Ok(CommandResponse::SleepTimerRemaining {
                remaining_ms: self.sleep_timer.remaining_ms(),
            }),
            CMD_REQUEST_METADATA_HISTORY => Ok(CommandResponse::MetadataHistory {
                history: self.metadata_history.entries().to_vec(),
            }),
            other => Err(AirwaveError::UnknownCommand(other.to_string())),
        }
    }

    async fn execute_player_command(&mut self, command: PlayerCommand) -> AirwaveResult<()> {
        match command {
            PlayerCommand::Prepare => {
                if self.resume_on_prepare {
                    // One-shot: the session was torn down while playing, so
                    // this wake-up resumes the most recently played station.
                    self.resume_on_prepare = false;
                    if let Some(item) = self.last_played_item() {
                        log::info!("[Session] Preparing resume of {}", item.title);
                        self.player.set_items(vec![item], 0).await?;
                        return Ok(());
                    }
                }
                self.rebuild_queue().await;
                Ok(())
            }
            PlayerCommand::PlayPause => {
                if self.player.is_playing() {
                    self.player.pause().await?;
                } else {
                    // Radio streams are continuous; resuming mid-buffer from
                    // a stale position is wrong.
                    self.player.seek_to_live().await?;
                    self.player.play().await?;
                }
                Ok(())
            }
            PlayerCommand::Play { station_id } => {
                if let Some(id) = station_id {
                    self.select_station(&id).await?;
                }
                self.player.play().await?;
                Ok(())
            }
            PlayerCommand::Pause => {
                self.player.pause().await?;
                Ok(())
            }
            PlayerCommand::Stop => {
                self.player.stop().await?;
                Ok(())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Player Events
    // ─────────────────────────────────────────────────────────────────────

    async fn handle_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::IsPlayingChanged { is_playing } => {
                self.handle_is_playing_changed(is_playing).await;
            }
            PlayerEvent::PlayWhenReadyChanged {
                play_when_ready,
                reason,
            } => {
                log::debug!(
                    "[Session] Play-when-ready changed: {play_when_ready} ({reason:?})"
                );
            }
            PlayerEvent::Error { error } => {
                log::error!("[Session] Player error: {error}");
                self.try_restart_playback().await;
            }
            PlayerEvent::MetadataChanged { raw } => {
                self.handle_metadata(&raw).await;
            }
        }
    }

    async fn handle_is_playing_changed(&mut self, is_playing: bool) {
        let station_id = self.player.current_item().map(|item| item.station_id);
        let station_index = station_id
            .as_deref()
            .and_then(|id| self.collection.collection().index_of(id));
        log::info!(
            "[Session] Playback changed: playing={is_playing} station={station_id:?}"
        );

        if is_playing {
            self.restart_attempts = 0;

            self.reconcile_collection().await;
            self.collection.mark_playing(station_id.as_deref(), true);
            self.save_collection().await;

            self.last_played = PlaybackState {
                is_playing: true,
                current_station_index: station_index,
                current_station_id: station_id.clone(),
            };
            self.save_playback_state().await;

            if self.sleep_timer.remaining_ms() > 0 {
                self.sleep_timer.start(true);
            }
        } else {
            self.reconcile_collection().await;
            self.collection.mark_playing(None, false);
            self.save_collection().await;

            self.last_played.is_playing = false;
            self.save_playback_state().await;

            self.sleep_timer.cancel(true);

            // With the stream gone the now-playing line falls back to the
            // station name.
            if let Some(item) = self.player.current_item() {
                self.handle_metadata(&item.fallback_title).await;
            }
        }

        self.emitter.emit_session(SessionEvent::PlaybackChanged {
            is_playing,
            station_id,
            station_index,
            timestamp: now_millis(),
        });
    }

    /// Re-reads the collection before writing it back so a stale cached
    /// copy cannot overwrite concurrent external edits.
    ///
    /// The synchronizer's notification ledger is left untouched; a pending
    /// changed-notification for the same edit still rebuilds the queue.
    async fn reconcile_collection(&mut self) {
        if let Err(e) = self.collection.reload(self.store.as_ref()).await {
            log::warn!("[Session] Collection reconciliation failed: {e}");
        }
    }

    async fn try_restart_playback(&mut self) {
        if self.restart_attempts < self.config.restart_max_attempts {
            self.restart_attempts += 1;
            log::info!(
                "[Session] Restarting playback (attempt {}/{})",
                self.restart_attempts,
                self.config.restart_max_attempts
            );
            self.emitter.emit_session(SessionEvent::RestartScheduled {
                attempt: self.restart_attempts,
                timestamp: now_millis(),
            });
            if let Err(e) = self.player.play().await {
                log::warn!("[Session] Restart attempt failed: {e}");
            }
        } else {
            let station_id = self.player.current_item().map(|item| item.station_id);
            log::error!(
                "[Session] Giving up after {} restart attempts",
                self.restart_attempts
            );
            if let Err(e) = self.player.stop().await {
                log::warn!("[Session] Stop after restart exhaustion failed: {e}");
            }
            self.emitter.emit_session(SessionEvent::RestartExhausted {
                station_id,
                attempts: self.restart_attempts,
                timestamp: now_millis(),
            });
        }
    }

    async fn handle_metadata(&mut self, raw: &str) {
        let entry = sanitize_metadata(raw);
        if !self.metadata_history.append(&entry) {
            return;
        }
        log::debug!("[Session] Metadata: {entry}");
        if let Err(e) = self
            .store
            .save_metadata_history(self.metadata_history.entries())
            .await
        {
            log::warn!("[Session] Failed to persist metadata history: {e}");
        }
        self.emitter.emit_session(SessionEvent::MetadataUpdated {
            entry,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Collection
    // ─────────────────────────────────────────────────────────────────────

    async fn handle_collection_notification(&mut self, notification: CollectionChanged) {
        let reloaded = match self
            .collection
            .handle_notification(notification, self.store.as_ref())
            .await
        {
            Ok(reloaded) => reloaded,
            Err(e) => {
                log::warn!("[Session] Collection reload failed: {e}");
                return;
            }
        };
        if !reloaded {
            return;
        }

        self.rebuild_queue().await;
        let collection = self.collection.collection();
        self.emitter.emit_session(SessionEvent::CollectionReloaded {
            station_count: collection.len(),
            modification_millis: collection.modification_millis,
            timestamp: now_millis(),
        });
    }

    /// Rebuilds the backend queue from the collection.
    ///
    /// The current station is preserved by id when it survived the edit;
    /// otherwise the persisted last-played index is used, clamped to the
    /// queue.
    async fn rebuild_queue(&mut self) {
        let items: Vec<PlayerItem> = self
            .collection
            .collection()
            .stations
            .iter()
            .filter_map(PlayerItem::from_station)
            .collect();
        if items.is_empty() {
            return;
        }

        let current_id = self
            .player
            .current_item()
            .map(|item| item.station_id)
            .or_else(|| self.last_played.current_station_id.clone());
        let start_index = current_id
            .and_then(|id| items.iter().position(|item| item.station_id == id))
            .or(self.last_played.current_station_index)
            .unwrap_or(0)
            .min(items.len() - 1);

        if let Err(e) = self.player.set_items(items, start_index).await {
            log::warn!("[Session] Failed to set backend queue: {e}");
        }
    }

    async fn select_station(&mut self, station_id: &str) -> AirwaveResult<()> {
        let items: Vec<PlayerItem> = self
            .collection
            .collection()
            .stations
            .iter()
            .filter_map(PlayerItem::from_station)
            .collect();
        let index = items
            .iter()
            .position(|item| item.station_id == station_id)
            .ok_or_else(|| AirwaveError::StationNotFound(station_id.to_string()))?;
        self.player.set_items(items, index).await?;
        Ok(())
    }

    fn last_played_item(&self) -> Option<PlayerItem> {
        let id = self.last_played.current_station_id.as_deref()?;
        self.collection
            .collection()
            .station_by_id(id)
            .and_then(PlayerItem::from_station)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    async fn save_playback_state(&self) {
        if let Err(e) = self.store.save_playback_state(&self.last_played).await {
            log::warn!("[Session] Failed to persist playback state: {e}");
        }
    }

    async fn save_collection(&self) {
        if let Err(e) = self
            .store
            .save_collection(self.collection.collection())
            .await
        {
            log::warn!("[Session] Failed to persist collection: {e}");
        }
    }

    fn snapshot(&self) -> SessionState {
        let collection = self.collection.collection();
        let current_station_id = self.player.current_item().map(|item| item.station_id);
        let current_station_index = current_station_id
            .as_deref()
            .and_then(|id| collection.index_of(id));
        SessionState {
            is_playing: self.player.is_playing(),
            current_station_id,
            current_station_index,
            backend: self.player.backend_kind(),
            sleep_timer_running: self.sleep_timer.is_running(),
            sleep_timer_remaining_ms: self.sleep_timer.remaining_ms(),
            metadata_history: self.metadata_history.entries().to_vec(),
            station_count: collection.len(),
            collection_modification_millis: collection.modification_millis,
            buffer_size_multiplier: self.buffer_size_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SleepTimerConfig;
    use crate::constants::CMD_REQUEST_METADATA_HISTORY;
    use crate::events::BroadcastEventBridge;
    use crate::player::{PlayerError, PlayerResult};
    use crate::station::{Collection, Station};
    use crate::storage::MemoryStateStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::time;

    struct MockBackend {
        calls: Mutex<Vec<String>>,
        state: Mutex<(Vec<PlayerItem>, Option<usize>, bool)>,
        events_tx: broadcast::Sender<PlayerEvent>,
    }

    impl MockBackend {
        fn new() -> Arc<Self> {
            let (events_tx, _) = broadcast::channel(32);
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                state: Mutex::new((Vec::new(), None, false)),
                events_tx,
            })
        }

        fn emit(&self, event: PlayerEvent) {
            let _ = self.events_tx.send(event);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn call_count(&self, name: &str) -> usize {
            self.calls.lock().iter().filter(|c| *c == name).count()
        }

        fn queue_len(&self) -> usize {
            self.state.lock().0.len()
        }
    }

    #[async_trait]
    impl BackendPlayer for MockBackend {
        fn kind(&self) -> PlayerBackendKind {
            PlayerBackendKind::Local
        }
        async fn play(&self) -> PlayerResult<()> {
            self.calls.lock().push("play".into());
            Ok(())
        }
        async fn pause(&self) -> PlayerResult<()> {
            self.calls.lock().push("pause".into());
            Ok(())
        }
        async fn stop(&self) -> PlayerResult<()> {
            self.calls.lock().push("stop".into());
            Ok(())
        }
        async fn seek_to_live(&self) -> PlayerResult<()> {
            self.calls.lock().push("seek_to_live".into());
            Ok(())
        }
        async fn set_items(&self, items: Vec<PlayerItem>, start: usize) -> PlayerResult<()> {
            self.calls.lock().push("set_items".into());
            let mut state = self.state.lock();
            state.1 = if items.is_empty() { None } else { Some(start) };
            state.0 = items;
            Ok(())
        }
        fn current_item(&self) -> Option<PlayerItem> {
            let state = self.state.lock();
            state.1.and_then(|i| state.0.get(i).cloned())
        }
        fn current_index(&self) -> Option<usize> {
            self.state.lock().1
        }
        fn is_playing(&self) -> bool {
            self.state.lock().2
        }
        fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
            self.events_tx.subscribe()
        }
    }

    struct Harness {
        handle: SessionHandle,
        backend: Arc<MockBackend>,
        store: Arc<MemoryStateStore>,
        events: broadcast::Receiver<SessionEvent>,
        collection_tx: broadcast::Sender<CollectionChanged>,
        collection: Collection,
    }

    async fn start_session(config: EngineConfig, store: Arc<MemoryStateStore>) -> Harness {
        let collection = store.load_collection().await.unwrap();
        let backend = MockBackend::new();
        let player = Arc::new(SwappablePlayer::new(TokioSpawner::current()));
        player.set_backend(backend.clone());
        tokio::task::yield_now().await;

        let bridge = BroadcastEventBridge::new(32);
        let events = bridge.subscribe();
        let (collection_tx, collection_rx) = broadcast::channel(8);

        let handle = PlaybackSession::start(
            config,
            player,
            store.clone(),
            Arc::new(bridge),
            collection_rx,
            TokioSpawner::current(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        Harness {
            handle,
            backend,
            store,
            events,
            collection_tx,
            collection,
        }
    }

    fn three_station_store() -> Arc<MemoryStateStore> {
        let collection = Collection::new(vec![
            Station::new("Alpha", "http://radio.example/alpha"),
            Station::new("Beta", "http://radio.example/beta"),
            Station::new("Gamma", "http://radio.example/gamma"),
        ]);
        Arc::new(MemoryStateStore::with_collection(collection))
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let h = start_session(EngineConfig::default(), three_station_store()).await;
        let err = h.handle.execute("NO_SUCH_COMMAND").await.unwrap_err();
        assert!(matches!(err, AirwaveError::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn cancel_notification_stops_playback() {
        let h = start_session(EngineConfig::default(), three_station_store()).await;
        let response = h.handle.execute(CMD_CANCEL_NOTIFICATION).await.unwrap();
        assert_eq!(response, CommandResponse::Ack);
        assert_eq!(h.backend.call_count("stop"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_timer_remaining_query_is_exact() {
        let config = EngineConfig {
            sleep_timer: SleepTimerConfig {
                duration_ms: 45_000,
                tick_interval_ms: 1_000,
            },
            ..EngineConfig::default()
        };
        let h = start_session(config, three_station_store()).await;

        h.handle.execute(CMD_START_SLEEP_TIMER).await.unwrap();
        for _ in 0..3 {
            time::advance(Duration::from_millis(1_000)).await;
            tokio::task::yield_now().await;
        }

        assert_eq!(
            h.handle.execute(CMD_REQUEST_SLEEP_TIMER_RUNNING).await.unwrap(),
            CommandResponse::SleepTimerRunning { running: true }
        );
        assert_eq!(
            h.handle
                .execute(CMD_REQUEST_SLEEP_TIMER_REMAINING)
                .await
                .unwrap(),
            CommandResponse::SleepTimerRemaining { remaining_ms: 42_000 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_timer_expiry_pauses_the_backend() {
        let config = EngineConfig {
            sleep_timer: SleepTimerConfig {
                duration_ms: 2_000,
                tick_interval_ms: 1_000,
            },
            ..EngineConfig::default()
        };
        let h = start_session(config, three_station_store()).await;

        h.handle.execute(CMD_START_SLEEP_TIMER).await.unwrap();
        for _ in 0..4 {
            time::advance(Duration::from_millis(1_000)).await;
            tokio::task::yield_now().await;
        }
        // give the owner task a turn to drain the expiry signal
        tokio::task::yield_now().await;

        assert_eq!(h.backend.call_count("pause"), 1);
    }

    #[tokio::test]
    async fn metadata_events_feed_the_history() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;

        h.backend.emit(PlayerEvent::MetadataChanged {
            raw: "Artist &amp; Band - Song".into(),
        });
        match next_event(&mut h.events).await {
            SessionEvent::MetadataUpdated { entry, .. } => {
                assert_eq!(entry, "Artist & Band - Song");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let response = h.handle.execute(CMD_REQUEST_METADATA_HISTORY).await.unwrap();
        assert_eq!(
            response,
            CommandResponse::MetadataHistory {
                history: vec!["Artist & Band - Song".to_string()],
            }
        );
        assert_eq!(
            h.store.load_metadata_history().await.unwrap(),
            vec!["Artist & Band - Song".to_string()]
        );
    }

    #[tokio::test]
    async fn becoming_playing_persists_state_and_marks_station() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;

        h.backend.emit(PlayerEvent::IsPlayingChanged { is_playing: true });
        match next_event(&mut h.events).await {
            SessionEvent::PlaybackChanged {
                is_playing,
                station_id,
                station_index,
                ..
            } => {
                assert!(is_playing);
                assert_eq!(station_id.as_deref(), Some(h.collection.stations[0].id.as_str()));
                assert_eq!(station_index, Some(0));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let state = h.store.load_playback_state().await.unwrap();
        assert!(state.is_playing);
        assert_eq!(state.current_station_index, Some(0));

        let saved = h.store.load_collection().await.unwrap();
        assert!(saved.stations[0].is_playing);
        assert!(!saved.stations[1].is_playing);
        // playback-state writes must not look like station edits
        assert_eq!(saved.modification_millis, h.collection.modification_millis);
    }

    #[tokio::test]
    async fn pause_does_not_overwrite_external_collection_edits() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;

        h.backend.emit(PlayerEvent::IsPlayingChanged { is_playing: true });
        next_event(&mut h.events).await;

        // the collaborator edits the collection while playback is running
        let mut edited = h.store.load_collection().await.unwrap();
        edited.stations.push(Station::new("Delta", "http://radio.example/delta"));
        edited.modification_millis += 10;
        h.store.save_collection(&edited).await.unwrap();

        h.backend.emit(PlayerEvent::IsPlayingChanged { is_playing: false });
        loop {
            if matches!(
                next_event(&mut h.events).await,
                SessionEvent::PlaybackChanged { is_playing: false, .. }
            ) {
                break;
            }
        }

        // the pause-path save must carry the edit, not the stale cache
        let saved = h.store.load_collection().await.unwrap();
        assert_eq!(saved.stations.len(), 4);
        assert!(saved.stations.iter().all(|s| !s.is_playing));
    }

    #[tokio::test]
    async fn notification_after_reconciliation_still_rebuilds_queue() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;
        let newer = h.collection.modification_millis + 10;

        let mut edited = h.store.load_collection().await.unwrap();
        edited.stations.push(Station::new("Delta", "http://radio.example/delta"));
        edited.modification_millis = newer;
        h.store.save_collection(&edited).await.unwrap();

        // playback starting reconciles against the store and sees the edit
        // before its changed-notification arrives
        h.backend.emit(PlayerEvent::IsPlayingChanged { is_playing: true });
        next_event(&mut h.events).await;

        h.collection_tx
            .send(CollectionChanged {
                modification_millis: newer,
            })
            .unwrap();
        match next_event(&mut h.events).await {
            SessionEvent::CollectionReloaded { station_count, .. } => {
                assert_eq!(station_count, 4);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.backend.queue_len(), 4);
    }

    #[tokio::test]
    async fn restart_loop_gives_up_after_the_cap() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;

        for attempt in 1..=5u32 {
            h.backend.emit(PlayerEvent::Error {
                error: PlayerError::Network("connection reset".into()),
            });
            match next_event(&mut h.events).await {
                SessionEvent::RestartScheduled { attempt: seen, .. } => {
                    assert_eq!(seen, attempt);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(h.backend.call_count("play"), 5);

        // the 6th consecutive failure stops the session outright
        h.backend.emit(PlayerEvent::Error {
            error: PlayerError::Network("connection reset".into()),
        });
        match next_event(&mut h.events).await {
            SessionEvent::RestartExhausted { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.backend.call_count("stop"), 1);
    }

    #[tokio::test]
    async fn restart_counter_resets_only_on_genuine_playback() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;

        for _ in 0..2 {
            h.backend.emit(PlayerEvent::Error {
                error: PlayerError::Network("reset".into()),
            });
            next_event(&mut h.events).await;
        }

        // a genuine is-playing transition resets the budget
        h.backend.emit(PlayerEvent::IsPlayingChanged { is_playing: true });
        loop {
            if matches!(
                next_event(&mut h.events).await,
                SessionEvent::PlaybackChanged { .. }
            ) {
                break;
            }
        }

        for attempt in 1..=5u32 {
            h.backend.emit(PlayerEvent::Error {
                error: PlayerError::Network("reset".into()),
            });
            match next_event(&mut h.events).await {
                SessionEvent::RestartScheduled { attempt: seen, .. } => {
                    assert_eq!(seen, attempt);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn play_pause_while_stopped_seeks_to_live_edge_first() {
        let h = start_session(EngineConfig::default(), three_station_store()).await;

        h.handle
            .player_command(PlayerCommand::PlayPause)
            .await
            .unwrap();
        let calls = h.backend.calls();
        let seek = calls.iter().position(|c| c == "seek_to_live").unwrap();
        let play = calls.iter().position(|c| c == "play").unwrap();
        assert!(seek < play);
    }

    #[tokio::test]
    async fn prepare_resumes_last_station_exactly_once() {
        let store = three_station_store();
        let collection = store.load_collection().await.unwrap();
        let beta_id = collection.stations[1].id.clone();
        store
            .save_playback_state(&PlaybackState {
                is_playing: true,
                current_station_index: Some(1),
                current_station_id: Some(beta_id.clone()),
            })
            .await
            .unwrap();

        let h = start_session(EngineConfig::default(), store).await;

        // first prepare consumes the one-shot flag: only the remembered
        // station is queued
        h.handle
            .player_command(PlayerCommand::Prepare)
            .await
            .unwrap();
        assert_eq!(h.backend.queue_len(), 1);
        assert_eq!(h.backend.current_item().unwrap().station_id, beta_id);

        // second prepare is the default path: full queue
        h.handle
            .player_command(PlayerCommand::Prepare)
            .await
            .unwrap();
        assert_eq!(h.backend.queue_len(), 3);
        assert_eq!(h.backend.current_item().unwrap().station_id, beta_id);
    }

    #[tokio::test]
    async fn play_with_unknown_station_fails() {
        let h = start_session(EngineConfig::default(), three_station_store()).await;
        let err = h
            .handle
            .player_command(PlayerCommand::Play {
                station_id: Some("missing".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AirwaveError::StationNotFound(_)));
    }

    #[tokio::test]
    async fn collection_notification_reloads_and_rebuilds_queue() {
        let mut h = start_session(EngineConfig::default(), three_station_store()).await;
        let initial_modification = h.collection.modification_millis;

        // external edit: one more station, newer timestamp
        let mut edited = h.store.load_collection().await.unwrap();
        edited.stations.push(Station::new("Delta", "http://radio.example/delta"));
        edited.modification_millis = initial_modification + 10;
        h.store.save_collection(&edited).await.unwrap();

        h.collection_tx
            .send(CollectionChanged {
                modification_millis: initial_modification + 10,
            })
            .unwrap();

        match next_event(&mut h.events).await {
            SessionEvent::CollectionReloaded {
                station_count,
                modification_millis,
                ..
            } => {
                assert_eq!(station_count, 4);
                assert_eq!(modification_millis, initial_modification + 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.backend.queue_len(), 4);

        // a stale duplicate of the same notification is ignored
        h.collection_tx
            .send(CollectionChanged {
                modification_millis: initial_modification + 10,
            })
            .unwrap();
        h.handle.execute(CMD_REQUEST_METADATA_HISTORY).await.unwrap();
        assert!(matches!(
            h.events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn state_snapshot_reflects_session() {
        let h = start_session(EngineConfig::default(), three_station_store()).await;
        let state = h.handle.state().await.unwrap();
        assert!(!state.is_playing);
        assert_eq!(state.station_count, 3);
        assert_eq!(state.backend, Some(PlayerBackendKind::Local));
        assert_eq!(state.current_station_index, Some(0));
        assert!(!state.sleep_timer_running);
    }
}
