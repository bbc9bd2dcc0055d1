//! Linear-additive backoff, the default schedule.

use super::strategy::BackoffSchedule;
use std::time::Duration;

/// Linear-additive backoff: `base + step * attempt`, optionally capped.
///
/// The default is `3s + 1s * attempt`, giving waits of 3s, 4s, 5s for the
/// first three retries. The schedule is deterministic and monotonically
/// non-decreasing.
///
/// # Examples
///
/// ```rust
/// use steadycall_core::retry::{BackoffSchedule, LinearBackoff};
/// use std::time::Duration;
///
/// let backoff = LinearBackoff::builder()
///     .base(Duration::from_millis(100))
///     .step(Duration::from_millis(50))
///     .cap(Duration::from_millis(300))
///     .build();
///
/// assert_eq!(backoff.wait(0), Duration::from_millis(100));
/// assert_eq!(backoff.wait(1), Duration::from_millis(150));
/// assert_eq!(backoff.wait(10), Duration::from_millis(300));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    base: Duration,
    step: Duration,
    cap: Option<Duration>,
}

/// Default first wait.
pub const DEFAULT_BASE: Duration = Duration::from_secs(3);

/// Default increment per attempt.
pub const DEFAULT_STEP: Duration = Duration::from_secs(1);

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            step: DEFAULT_STEP,
            cap: None,
        }
    }
}

impl LinearBackoff {
    /// Schedule with the given base and step and no cap.
    pub fn new(base: Duration, step: Duration) -> Self {
        Self {
            base,
            step,
            cap: None,
        }
    }

    /// Start a builder.
    pub fn builder() -> LinearBackoffBuilder {
        LinearBackoffBuilder::default()
    }

    /// Wait before the first retry.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Increment per attempt.
    pub fn step(&self) -> Duration {
        self.step
    }
}

impl BackoffSchedule for LinearBackoff {
    fn wait(&self, attempt: u32) -> Duration {
        let wait = self.step.saturating_mul(attempt).saturating_add(self.base);
        match self.cap {
            Some(cap) => wait.min(cap),
            None => wait,
        }
    }
}

/// Builder for [`LinearBackoff`]. Unset fields take the defaults.
#[derive(Debug, Default)]
pub struct LinearBackoffBuilder {
    base: Option<Duration>,
    step: Option<Duration>,
    cap: Option<Duration>,
}

impl LinearBackoffBuilder {
    /// Wait before the first retry. Default: 3s.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = Some(base);
        self
    }

    /// Increment per attempt. Default: 1s.
    pub fn step(mut self, step: Duration) -> Self {
        self.step = Some(step);
        self
    }

    /// Upper bound on any single wait. Default: none.
    pub fn cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Build the schedule.
    pub fn build(self) -> LinearBackoff {
        LinearBackoff {
            base: self.base.unwrap_or(DEFAULT_BASE),
            step: self.step.unwrap_or(DEFAULT_STEP),
            cap: self.cap,
        }
    }
}
