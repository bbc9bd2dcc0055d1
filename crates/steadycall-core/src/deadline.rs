//! Per-attempt deadlines.

use std::time::Duration;
use tokio::time::Instant;

// Roughly 30 years; stands in for timeouts too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A fixed instant by which one physical attempt must finish.
///
/// Computed fresh for every attempt, so the total duration of a logical call
/// is independent of the per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    ///
    /// Timeouts past what an `Instant` can represent saturate to a deadline
    /// decades away.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(now.checked_add(timeout).unwrap_or(now + FAR_FUTURE))
    }

    /// Deadline at a given instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// The underlying instant.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn has_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }
}
