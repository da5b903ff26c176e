//! Stable player handle across backend swaps.
//!
//! The session orchestrator holds one [`SwappablePlayer`] for its whole
//! lifetime. The concrete backend behind it changes at runtime (local
//! decoder ⇄ cast receiver); subscribers keep their event subscription
//! across swaps because events are re-broadcast through a channel owned by
//! the swappable player itself, not by any backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::constants::PLAYER_EVENT_CHANNEL_CAPACITY;
use crate::runtime::{TaskSpawner, TokioSpawner};

use super::{BackendPlayer, PlayerBackendKind, PlayerEvent, PlayerItem, PlayerResult};

struct ActiveBackend {
    backend: Arc<dyn BackendPlayer>,
    forward_cancel: CancellationToken,
}

/// Forwards all playback operations and events to exactly one active
/// backend, which can be replaced at runtime via [`set_backend`].
///
/// # Swap semantics
///
/// A swap commits atomically under a write lock: operations arriving during
/// a swap observe either the old or the new backend in full, never a mix.
/// Events already queued from the old backend may still arrive after the
/// swap; they are dropped by a generation check so subscribers only see
/// events from the backend that was active when the event was forwarded.
///
/// [`set_backend`]: SwappablePlayer::set_backend
pub struct SwappablePlayer {
    active: RwLock<Option<ActiveBackend>>,
    events_tx: broadcast::Sender<PlayerEvent>,
    /// Bumped on every swap; forward tasks from older backends observe a
    /// mismatch and stop forwarding.
    generation: Arc<AtomicU64>,
    spawner: TokioSpawner,
}

impl SwappablePlayer {
    /// Creates a swappable player with no active backend.
    #[must_use]
    pub fn new(spawner: TokioSpawner) -> Self {
        let (events_tx, _) = broadcast::channel(PLAYER_EVENT_CHANNEL_CAPACITY);
        Self {
            active: RwLock::new(None),
            events_tx,
            generation: Arc::new(AtomicU64::new(0)),
            spawner,
        }
    }

    /// Replaces the active backend.
    ///
    /// The previous backend is detached from event forwarding but not
    /// stopped; backend lifecycle ownership stays with the caller.
    pub fn set_backend(&self, backend: Arc<dyn BackendPlayer>) {
        let kind = backend.kind();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let forward_cancel = CancellationToken::new();

        let mut backend_rx = backend.subscribe();
        let events_tx = self.events_tx.clone();
        let cancel = forward_cancel.clone();
        let live_generation = Arc::clone(&self.generation);

        {
            let mut active = self.active.write();
            if let Some(previous) = active.take() {
                previous.forward_cancel.cancel();
                log::info!(
                    "[SwappablePlayer] Detaching {} backend",
                    previous.backend.kind()
                );
            }
            *active = Some(ActiveBackend {
                backend,
                forward_cancel,
            });
        }

        log::info!("[SwappablePlayer] Activated {kind} backend (generation {generation})");

        self.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = backend_rx.recv() => match event {
                        Ok(event) => {
                            // A swap may have committed while this event sat
                            // in the channel; never forward stale events.
                            if live_generation.load(Ordering::SeqCst) != generation {
                                break;
                            }
                            let _ = events_tx.send(event);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("[SwappablePlayer] Event forwarding lagged, skipped {skipped}");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            log::debug!("[SwappablePlayer] Forward task for generation {generation} ended");
        });
    }

    /// Subscribes to the forwarded event stream.
    ///
    /// The subscription survives backend swaps.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events_tx.subscribe()
    }

    /// Kind of the active backend, if any.
    #[must_use]
    pub fn backend_kind(&self) -> Option<PlayerBackendKind> {
        self.active.read().as_ref().map(|a| a.backend.kind())
    }

    /// Whether a backend is installed.
    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.active.read().is_some()
    }

    // Operations clone the backend handle under a short read lock and call
    // it outside the lock, so a concurrent swap never blocks on an in-flight
    // operation and the operation sees one consistent backend.
    fn current_backend(&self) -> Option<Arc<dyn BackendPlayer>> {
        self.active.read().as_ref().map(|a| Arc::clone(&a.backend))
    }

    /// Forwards `play` to the active backend. No-op without a backend.
    pub async fn play(&self) -> PlayerResult<()> {
        match self.current_backend() {
            Some(backend) => backend.play().await,
            None => Ok(()),
        }
    }

    /// Forwards `pause` to the active backend. No-op without a backend.
    pub async fn pause(&self) -> PlayerResult<()> {
        match self.current_backend() {
            Some(backend) => backend.pause().await,
            None => Ok(()),
        }
    }

    /// Forwards `stop` to the active backend. No-op without a backend.
    pub async fn stop(&self) -> PlayerResult<()> {
        match self.current_backend() {
            Some(backend) => backend.stop().await,
            None => Ok(()),
        }
    }

    /// Forwards `seek_to_live` to the active backend. No-op without a backend.
    pub async fn seek_to_live(&self) -> PlayerResult<()> {
        match self.current_backend() {
            Some(backend) => backend.seek_to_live().await,
            None => Ok(()),
        }
    }

    /// Forwards `set_items` to the active backend. No-op without a backend.
    pub async fn set_items(
        &self,
        items: Vec<PlayerItem>,
        start_index: usize,
    ) -> PlayerResult<()> {
        match self.current_backend() {
            Some(backend) => backend.set_items(items, start_index).await,
            None => Ok(()),
        }
    }

    /// Currently selected item of the active backend.
    #[must_use]
    pub fn current_item(&self) -> Option<PlayerItem> {
        self.current_backend().and_then(|b| b.current_item())
    }

    /// Index of the currently selected item of the active backend.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current_backend().and_then(|b| b.current_index())
    }

    /// Whether the active backend is producing audio.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.current_backend().is_some_and(|b| b.is_playing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct MockBackend {
        kind: PlayerBackendKind,
        calls: Mutex<Vec<&'static str>>,
        events_tx: broadcast::Sender<PlayerEvent>,
    }

    impl MockBackend {
        fn new(kind: PlayerBackendKind) -> Arc<Self> {
            let (events_tx, _) = broadcast::channel(16);
            Arc::new(Self {
                kind,
                calls: Mutex::new(Vec::new()),
                events_tx,
            })
        }

        fn emit(&self, event: PlayerEvent) {
            let _ = self.events_tx.send(event);
        }
    }

    #[async_trait]
    impl BackendPlayer for MockBackend {
        fn kind(&self) -> PlayerBackendKind {
            self.kind
        }
        async fn play(&self) -> PlayerResult<()> {
            self.calls.lock().push("play");
            Ok(())
        }
        async fn pause(&self) -> PlayerResult<()> {
            self.calls.lock().push("pause");
            Ok(())
        }
        async fn stop(&self) -> PlayerResult<()> {
            self.calls.lock().push("stop");
            Ok(())
        }
        async fn seek_to_live(&self) -> PlayerResult<()> {
            self.calls.lock().push("seek_to_live");
            Ok(())
        }
        async fn set_items(&self, _items: Vec<PlayerItem>, _start: usize) -> PlayerResult<()> {
            self.calls.lock().push("set_items");
            Ok(())
        }
        fn current_item(&self) -> Option<PlayerItem> {
            None
        }
        fn current_index(&self) -> Option<usize> {
            None
        }
        fn is_playing(&self) -> bool {
            false
        }
        fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
            self.events_tx.subscribe()
        }
    }

    #[tokio::test]
    async fn operations_reach_exactly_the_active_backend() {
        let player = SwappablePlayer::new(TokioSpawner::current());
        let local = MockBackend::new(PlayerBackendKind::Local);
        let remote = MockBackend::new(PlayerBackendKind::Remote);

        player.set_backend(local.clone());
        player.play().await.unwrap();

        player.set_backend(remote.clone());
        player.pause().await.unwrap();

        assert_eq!(*local.calls.lock(), vec!["play"]);
        assert_eq!(*remote.calls.lock(), vec!["pause"]);
    }

    #[tokio::test]
    async fn subscription_survives_backend_swap() {
        let player = SwappablePlayer::new(TokioSpawner::current());
        let mut rx = player.subscribe();

        let local = MockBackend::new(PlayerBackendKind::Local);
        player.set_backend(local.clone());
        tokio::task::yield_now().await;
        local.emit(PlayerEvent::IsPlayingChanged { is_playing: true });

        match rx.recv().await.unwrap() {
            PlayerEvent::IsPlayingChanged { is_playing } => assert!(is_playing),
            other => panic!("unexpected event: {other:?}"),
        }

        let remote = MockBackend::new(PlayerBackendKind::Remote);
        player.set_backend(remote.clone());
        tokio::task::yield_now().await;
        remote.emit(PlayerEvent::MetadataChanged {
            raw: "StreamTitle='x';".into(),
        });

        match rx.recv().await.unwrap() {
            PlayerEvent::MetadataChanged { raw } => {
                assert_eq!(raw, "StreamTitle='x';");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn detached_backend_events_are_dropped() {
        let player = SwappablePlayer::new(TokioSpawner::current());
        let mut rx = player.subscribe();

        let local = MockBackend::new(PlayerBackendKind::Local);
        let remote = MockBackend::new(PlayerBackendKind::Remote);
        player.set_backend(local.clone());
        tokio::task::yield_now().await;
        player.set_backend(remote.clone());
        tokio::task::yield_now().await;

        // the old backend keeps emitting after the swap committed
        local.emit(PlayerEvent::IsPlayingChanged { is_playing: true });
        remote.emit(PlayerEvent::IsPlayingChanged { is_playing: false });
        tokio::task::yield_now().await;

        match rx.recv().await.unwrap() {
            PlayerEvent::IsPlayingChanged { is_playing } => assert!(!is_playing),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn operations_without_backend_are_noops() {
        let player = SwappablePlayer::new(TokioSpawner::current());
        assert!(!player.has_backend());
        assert!(player.backend_kind().is_none());
        player.play().await.unwrap();
        player.stop().await.unwrap();
        assert!(!player.is_playing());
    }
}
