//! Composition root for the playback engine.
//!
//! Wires the swappable player, session orchestrator, event bridge and
//! collection notification channel together, and runs the backend
//! availability switcher that swaps local ⇄ remote backends at runtime.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::constants::{COLLECTION_NOTIFICATION_CAPACITY, EVENT_CHANNEL_CAPACITY};
use crate::error::AirwaveResult;
use crate::events::{BroadcastEventBridge, SessionEvent};
use crate::player::{BackendPlayer, SwappablePlayer};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{CollectionChanged, PlaybackSession, SessionHandle};
use crate::storage::StateStore;

/// Everything the bootstrap needs to assemble an engine.
pub struct EngineOptions {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Persisted-state store.
    pub store: Arc<dyn StateStore>,
    /// The local playback backend, active by default.
    pub local_backend: Arc<dyn BackendPlayer>,
    /// Optional remote (cast) backend. Absence is "capability absent", not
    /// an error.
    pub remote_backend: Option<Arc<dyn BackendPlayer>>,
    /// Availability signal for the remote backend. `true` swaps playback to
    /// the remote backend, `false` swaps it back to local.
    pub remote_availability: Option<watch::Receiver<bool>>,
}

/// A running engine, assembled by [`bootstrap`].
pub struct Engine {
    /// Handle to the session owner task.
    pub session: SessionHandle,
    events: BroadcastEventBridge,
    collection_tx: broadcast::Sender<CollectionChanged>,
    cancel: CancellationToken,
}

impl Engine {
    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event bridge, for wiring an external emitter.
    #[must_use]
    pub fn events(&self) -> &BroadcastEventBridge {
        &self.events
    }

    /// Notifies the engine that the persisted collection changed.
    pub fn notify_collection_changed(&self, modification_millis: u64) {
        let _ = self.collection_tx.send(CollectionChanged {
            modification_millis,
        });
    }

    /// Shuts down the session owner task and helper tasks.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Shutting down engine");
        self.cancel.cancel();
    }
}

/// Assembles and starts the playback engine.
pub async fn bootstrap(options: EngineOptions) -> AirwaveResult<Engine> {
    let EngineOptions {
        config,
        store,
        local_backend,
        remote_backend,
        remote_availability,
    } = options;

    let spawner = TokioSpawner::current();
    let cancel = CancellationToken::new();
    let events = BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY);
    let (collection_tx, collection_rx) = broadcast::channel(COLLECTION_NOTIFICATION_CAPACITY);

    let player = Arc::new(SwappablePlayer::new(spawner.clone()));
    player.set_backend(Arc::clone(&local_backend));

    let session = PlaybackSession::start(
        config,
        Arc::clone(&player),
        store,
        Arc::new(events.clone()),
        collection_rx,
        spawner.clone(),
        cancel.clone(),
    )
    .await?;

    match (remote_backend, remote_availability) {
        (Some(remote), Some(availability)) => {
            spawn_availability_switcher(
                &spawner,
                session.clone(),
                local_backend,
                remote,
                availability,
                cancel.clone(),
            );
        }
        (None, _) => log::info!("[Bootstrap] No remote backend configured"),
        (Some(_), None) => {
            log::warn!("[Bootstrap] Remote backend has no availability signal, ignoring it");
        }
    }

    Ok(Engine {
        session,
        events,
        collection_tx,
        cancel,
    })
}

/// Swaps the session's backend whenever remote availability flips.
fn spawn_availability_switcher(
    spawner: &TokioSpawner,
    session: SessionHandle,
    local: Arc<dyn BackendPlayer>,
    remote: Arc<dyn BackendPlayer>,
    mut availability: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    spawner.spawn(async move {
        let mut remote_active = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = availability.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let available = *availability.borrow_and_update();
                    if available == remote_active {
                        continue;
                    }
                    remote_active = available;
                    let backend = if available {
                        log::info!("[Bootstrap] Remote backend available, switching");
                        Arc::clone(&remote)
                    } else {
                        log::info!("[Bootstrap] Remote backend gone, switching to local");
                        Arc::clone(&local)
                    };
                    if session.set_backend(backend).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
}
