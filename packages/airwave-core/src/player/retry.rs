//! Transport-level reconnect policy.
//!
//! Decides whether a failed stream load should be retried. The interval is
//! constant rather than exponential: radio streams reconnect quickly or not
//! at all, and a fixed short interval minimizes perceived silence while the
//! count cap bounds retry storms.

use std::time::Duration;

use crate::constants::{MAX_RECONNECTION_COUNT, RECONNECTION_WAIT_INTERVAL};

/// Classification of a failed stream load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// Network I/O failure (connect refused, reset, timeout).
    NetworkIo,
    /// Anything else (decode errors, bad responses).
    Other,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    RetryAfter(Duration),
    /// Give up; the stream is unrecoverable at the transport layer.
    NoRetry,
}

impl RetryDecision {
    /// Whether this decision allows another attempt.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::RetryAfter(_))
    }
}

/// Pure decision function for transport-level reconnects.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_reconnects: u32,
    wait_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_reconnects: MAX_RECONNECTION_COUNT,
            wait_interval: RECONNECTION_WAIT_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit limits.
    #[must_use]
    pub fn new(max_reconnects: u32, wait_interval: Duration) -> Self {
        Self {
            max_reconnects,
            wait_interval,
        }
    }

    /// Decides whether the `error_count`-th consecutive failure of the
    /// given kind should be retried.
    #[must_use]
    pub fn decide(&self, error_count: u32, kind: LoadErrorKind) -> RetryDecision {
        if kind == LoadErrorKind::NetworkIo && error_count <= self.max_reconnects {
            RetryDecision::RetryAfter(self.wait_interval)
        } else {
            RetryDecision::NoRetry
        }
    }

    /// Minimum retry count to configure on loadable resources.
    ///
    /// Effectively unbounded: the count cap in [`decide`] is the real
    /// ceiling, not a fixed attempt limit on individual loads.
    ///
    /// [`decide`]: RetryPolicy::decide
    #[must_use]
    pub fn minimum_retry_count(&self) -> u32 {
        u32::MAX
    }
}
