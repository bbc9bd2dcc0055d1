//! Retry events and the sinks that receive them.

use crate::classify::RetryDecision;
use crate::outcome::Failure;
use std::sync::Arc;
use std::time::Duration;

/// Emitted once per retry, before the backoff wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEvent {
    /// Index of the attempt that just failed (0-based).
    pub attempt: u32,
    /// How long the engine will wait before the next attempt.
    pub wait: Duration,
    /// How the failure was classified.
    pub decision: RetryDecision,
    /// The failure itself.
    pub failure: Failure,
}

/// How a logical call ended without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEvent {
    /// Total attempts made.
    pub attempts: u32,
    /// Whether the retry budget ran out.
    pub exhausted: bool,
    /// How the last failure was classified.
    pub decision: RetryDecision,
    /// The last failure.
    pub failure: Failure,
}

/// Receiver for retry and terminal-failure events.
///
/// Injected at construction; the engine never logs on its own.
pub trait RetrySink: Send + Sync {
    /// A retryable failure is about to be retried.
    fn on_retry(&self, event: &RetryEvent);

    /// A logical call ended in failure.
    fn on_terminal(&self, event: &TerminalEvent) {
        let _ = event;
    }
}

impl<S: RetrySink + ?Sized> RetrySink for Arc<S> {
    fn on_retry(&self, event: &RetryEvent) {
        (**self).on_retry(event);
    }

    fn on_terminal(&self, event: &TerminalEvent) {
        (**self).on_terminal(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl RetrySink for NoopSink {
    fn on_retry(&self, _event: &RetryEvent) {}
}

/// Sink that reports events through `tracing`.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl RetrySink for TracingSink {
    fn on_retry(&self, event: &RetryEvent) {
        tracing::error!(
            attempt = event.attempt,
            reason = %event.decision,
            wait_secs = event.wait.as_secs_f64(),
            error = %event.failure,
            "request failed, retrying"
        );
    }

    fn on_terminal(&self, event: &TerminalEvent) {
        if event.exhausted {
            tracing::warn!(
                attempts = event.attempts,
                reason = %event.decision,
                error = %event.failure,
                "retries exhausted"
            );
        } else {
            tracing::debug!(
                attempts = event.attempts,
                reason = %event.decision,
                error = %event.failure,
                "call failed without retry"
            );
        }
    }
}
