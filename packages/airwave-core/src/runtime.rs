//! Task spawning abstraction for runtime independence.
//!
//! This module provides a [`TaskSpawner`] trait that allows the core library
//! to spawn background tasks without being tied to a specific async runtime,
//! so embedders can route engine tasks onto their own executor.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// Allows core services to spawn asynchronous work without knowing the
/// underlying runtime. Implementations should ensure tasks are properly
/// tracked and can complete even if the spawner is dropped.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller and will continue until
    /// completion. The spawner does not provide a way to cancel or join
    /// the spawned task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner for standalone server and general use.
///
/// Uses a Tokio runtime handle to spawn tasks. This is the default
/// implementation for non-embedded environments.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
