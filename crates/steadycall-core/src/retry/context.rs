//! Per-logical-call attempt bookkeeping.

use std::time::Duration;

/// Attempt counter for one logical call.
///
/// Owned by a single in-flight call and handed to each attempt by value;
/// never shared between concurrent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    attempt: u32,
    max_retries: u32,
    elapsed_backoff: Duration,
}

impl AttemptContext {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
            elapsed_backoff: Duration::ZERO,
        }
    }

    /// Index of the current attempt (0-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, `max_retries + 1`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff waited so far.
    pub fn elapsed_backoff(&self) -> Duration {
        self.elapsed_backoff
    }

    /// Whether this is the first attempt.
    pub fn is_first(&self) -> bool {
        self.attempt == 0
    }

    /// Whether the retry budget is spent after this attempt.
    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_retries
    }

    pub(crate) fn advance(&mut self, waited: Duration) {
        self.attempt += 1;
        self.elapsed_backoff = self.elapsed_backoff.saturating_add(waited);
    }
}
