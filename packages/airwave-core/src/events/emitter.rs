//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete
//! broadcast channels, enabling testing and alternative transports.

use super::SessionEvent;

/// Trait for emitting domain events without knowledge of transport.
///
/// Services use this trait to emit events, decoupling them from the
/// specifics of how events are delivered to clients (broadcast channel,
/// WebSocket, embedder callback, etc.).
pub trait EventEmitter: Send + Sync {
    /// Emits a playback session event.
    fn emit_session(&self, event: SessionEvent);
}

/// Emitter that drops all events.
///
/// Useful for tests and for embedders that poll state instead of
/// subscribing to events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}
}
