//! Sleep timer countdown state machine.
//!
//! The timer is either idle (`time_remaining == 0`) or running with a
//! decreasing remaining time. Expiry has exactly one side effect outside
//! the timer's own state: a pause request delivered through the expiry
//! channel to the session owner task.
//!
//! Cancellation with `delayed_reset` keeps the displayed state for a short
//! grace period so an observer reading "time remaining" during a
//! pause-triggered cancel does not see an abrupt jump to zero.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SleepTimerConfig;
use crate::constants::SLEEP_TIMER_DELAYED_RESET;
use crate::events::{EventEmitter, SessionEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::storage::{StateStore, StateStoreExt};
use crate::utils::now_millis;

#[derive(Default)]
struct TimerInner {
    running: bool,
    time_remaining_ms: u64,
    countdown_cancel: Option<CancellationToken>,
    reset_cancel: Option<CancellationToken>,
}

/// Countdown timer that requests a pause on expiry.
pub struct SleepTimer {
    inner: Arc<Mutex<TimerInner>>,
    config: SleepTimerConfig,
    emitter: Arc<dyn EventEmitter>,
    store: Arc<dyn StateStore>,
    expiry_tx: mpsc::Sender<()>,
    spawner: TokioSpawner,
}

impl SleepTimer {
    /// Creates a timer plus the receiver for its expiry signal.
    ///
    /// The session owner task must drain the receiver and pause playback
    /// when a signal arrives.
    pub fn new(
        config: SleepTimerConfig,
        emitter: Arc<dyn EventEmitter>,
        store: Arc<dyn StateStore>,
        spawner: TokioSpawner,
    ) -> (Self, mpsc::Receiver<()>) {
        let (expiry_tx, expiry_rx) = mpsc::channel(1);
        (
            Self {
                inner: Arc::new(Mutex::new(TimerInner::default())),
                config,
                emitter,
                store,
                expiry_tx,
                spawner,
            },
            expiry_rx,
        )
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Remaining time in milliseconds (0 when idle).
    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        self.inner.lock().time_remaining_ms
    }

    /// Starts the countdown.
    ///
    /// With `continue_previous` the duration is the remaining time of the
    /// previously running timer (resume after pause); without it the
    /// configured duration is added on top of any remaining time, so
    /// starting twice extends the window.
    pub fn start(&self, continue_previous: bool) {
        let countdown_cancel = CancellationToken::new();
        let duration_ms = {
            let mut inner = self.inner.lock();
            let remaining = inner.time_remaining_ms;
            let duration_ms = if continue_previous {
                remaining
            } else {
                self.config.duration_ms + remaining
            };
            if duration_ms == 0 {
                return;
            }

            if let Some(cancel) = inner.countdown_cancel.take() {
                cancel.cancel();
            }
            if let Some(cancel) = inner.reset_cancel.take() {
                cancel.cancel();
            }
            inner.running = true;
            inner.time_remaining_ms = duration_ms;
            inner.countdown_cancel = Some(countdown_cancel.clone());
            duration_ms
        };

        log::info!("[SleepTimer] Started ({duration_ms}ms, continue={continue_previous})");
        self.emit_changed(true, duration_ms);
        self.persist_running(true);
        self.spawn_countdown(countdown_cancel);
    }

    /// Cancels the countdown.
    ///
    /// With `delayed_reset` the visible state is cleared after a short
    /// grace period instead of immediately.
    pub fn cancel(&self, delayed_reset: bool) {
        let was_active = {
            let mut inner = self.inner.lock();
            let was_active = inner.countdown_cancel.is_some() || inner.time_remaining_ms > 0;
            if let Some(cancel) = inner.countdown_cancel.take() {
                cancel.cancel();
            }
            if let Some(cancel) = inner.reset_cancel.take() {
                cancel.cancel();
            }
            was_active
        };
        if !was_active {
            return;
        }

        log::info!("[SleepTimer] Cancelled (delayed_reset={delayed_reset})");
        self.persist_running(false);

        if delayed_reset {
            let reset_cancel = CancellationToken::new();
            self.inner.lock().reset_cancel = Some(reset_cancel.clone());

            let inner = Arc::clone(&self.inner);
            let emitter = Arc::clone(&self.emitter);
            self.spawner.spawn(async move {
                tokio::select! {
                    _ = reset_cancel.cancelled() => {}
                    _ = tokio::time::sleep(SLEEP_TIMER_DELAYED_RESET) => {
                        {
                            let mut inner = inner.lock();
                            inner.running = false;
                            inner.time_remaining_ms = 0;
                            inner.reset_cancel = None;
                        }
                        emitter.emit_session(SessionEvent::SleepTimerChanged {
                            running: false,
                            remaining_ms: 0,
                            timestamp: now_millis(),
                        });
                    }
                }
            });
        } else {
            {
                let mut inner = self.inner.lock();
                inner.running = false;
                inner.time_remaining_ms = 0;
            }
            self.emit_changed(false, 0);
        }
    }

    fn spawn_countdown(&self, cancel: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        let emitter = Arc::clone(&self.emitter);
        let store = Arc::clone(&self.store);
        let expiry_tx = self.expiry_tx.clone();
        let tick = self.config.tick_interval();
        let tick_ms = self.config.tick_interval_ms;

        self.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(tick) => {}
                }

                let remaining = {
                    let mut locked = inner.lock();
                    // a cancel raced the tick; last write wins
                    if cancel.is_cancelled() {
                        return;
                    }
                    locked.time_remaining_ms = locked.time_remaining_ms.saturating_sub(tick_ms);
                    if locked.time_remaining_ms == 0 {
                        locked.running = false;
                        locked.countdown_cancel = None;
                    }
                    locked.time_remaining_ms
                };

                if remaining > 0 {
                    emitter.emit_session(SessionEvent::SleepTimerChanged {
                        running: true,
                        remaining_ms: remaining,
                        timestamp: now_millis(),
                    });
                    continue;
                }

                log::info!("[SleepTimer] Expired, requesting pause");
                emitter.emit_session(SessionEvent::SleepTimerChanged {
                    running: false,
                    remaining_ms: 0,
                    timestamp: now_millis(),
                });
                if let Err(e) = store.save_sleep_timer_running(false).await {
                    log::warn!("[SleepTimer] Failed to persist timer flag: {e}");
                }
                let _ = expiry_tx.send(()).await;
                return;
            }
        });
    }

    fn emit_changed(&self, running: bool, remaining_ms: u64) {
        self.emitter.emit_session(SessionEvent::SleepTimerChanged {
            running,
            remaining_ms,
            timestamp: now_millis(),
        });
    }

    fn persist_running(&self, running: bool) {
        let store = Arc::clone(&self.store);
        self.spawner.spawn(async move {
            if let Err(e) = store.save_sleep_timer_running(running).await {
                log::warn!("[SleepTimer] Failed to persist timer flag: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::storage::MemoryStateStore;
    use std::time::Duration;
    use tokio::time;

    fn timer_with(duration_ms: u64) -> (SleepTimer, mpsc::Receiver<()>, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let (timer, expiry_rx) = SleepTimer::new(
            SleepTimerConfig {
                duration_ms,
                tick_interval_ms: 1_000,
            },
            Arc::new(NoopEventEmitter),
            store.clone(),
            TokioSpawner::current(),
        );
        (timer, expiry_rx, store)
    }

    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            // let freshly spawned tasks register their timers before the
            // clock moves, otherwise the first tick is silently skipped
            tokio::task::yield_now().await;
            time::advance(Duration::from_millis(1_000)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn continuation_preserves_remaining_time() {
        let (timer, _expiry_rx, _store) = timer_with(10_000);
        timer.start(false);
        advance_secs(3).await;
        let remaining = timer.remaining_ms();
        assert_eq!(remaining, 7_000);

        timer.start(true);
        assert_eq!(timer.remaining_ms(), remaining);
        assert!(timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_adds_default_duration() {
        let (timer, _expiry_rx, _store) = timer_with(10_000);
        timer.start(false);
        advance_secs(4).await;
        assert_eq!(timer.remaining_ms(), 6_000);

        timer.start(false);
        assert_eq!(timer.remaining_ms(), 16_000);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_pauses_exactly_once() {
        let (timer, mut expiry_rx, store) = timer_with(3_000);
        timer.start(false);
        advance_secs(5).await;

        assert!(!timer.is_running());
        assert_eq!(timer.remaining_ms(), 0);
        assert!(expiry_rx.try_recv().is_ok());
        assert!(expiry_rx.try_recv().is_err());
        assert!(!store.load_sleep_timer_running().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_cancel_clears_state() {
        let (timer, mut expiry_rx, store) = timer_with(10_000);
        timer.start(false);
        advance_secs(2).await;

        timer.cancel(false);
        assert!(!timer.is_running());
        assert_eq!(timer.remaining_ms(), 0);

        advance_secs(20).await;
        assert!(expiry_rx.try_recv().is_err());
        assert!(!store.load_sleep_timer_running().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_cancel_keeps_state_for_grace_period() {
        let (timer, mut expiry_rx, _store) = timer_with(10_000);
        timer.start(false);
        advance_secs(2).await;

        timer.cancel(true);
        // state survives until the grace period elapses
        assert_eq!(timer.remaining_ms(), 8_000);

        tokio::task::yield_now().await;
        time::advance(Duration::from_millis(2_500)).await;
        tokio::task::yield_now().await;
        assert!(!timer.is_running());
        assert_eq!(timer.remaining_ms(), 0);
        assert!(expiry_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_within_grace_period_continues_countdown() {
        let (timer, _expiry_rx, _store) = timer_with(10_000);
        timer.start(false);
        advance_secs(2).await;

        timer.cancel(true);
        time::advance(Duration::from_millis(1_000)).await;
        tokio::task::yield_now().await;

        timer.start(true);
        assert!(timer.is_running());
        assert_eq!(timer.remaining_ms(), 8_000);

        // the pending delayed reset was cancelled by the restart
        advance_secs(3).await;
        assert!(timer.is_running());
        assert_eq!(timer.remaining_ms(), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_with_no_previous_timer_is_a_noop() {
        let (timer, _expiry_rx, _store) = timer_with(10_000);
        timer.start(true);
        assert!(!timer.is_running());
        assert_eq!(timer.remaining_ms(), 0);
    }
}
