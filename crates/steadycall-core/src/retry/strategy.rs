//! The backoff schedule seam.

use std::sync::Arc;
use std::time::Duration;

/// Maps a retry index to the wait before the next attempt.
///
/// `attempt` is the index of the attempt that just failed, so `wait(0)` is
/// the pause between the first and second attempt.
///
/// Implementations must be side-effect free; deterministic schedules are
/// independently testable and the default one is deterministic. Jittered
/// variants conform to the same signature.
///
/// # Examples
///
/// ```rust
/// use steadycall_core::retry::{BackoffSchedule, LinearBackoff};
/// use std::time::Duration;
///
/// let schedule = LinearBackoff::default();
/// assert_eq!(schedule.wait(0), Duration::from_secs(3));
/// assert_eq!(schedule.wait(2), Duration::from_secs(5));
/// assert_eq!(schedule.total_wait(3), Duration::from_secs(12));
/// ```
pub trait BackoffSchedule: Send + Sync {
    /// Wait before the attempt following `attempt`.
    fn wait(&self, attempt: u32) -> Duration;

    /// Upper bound on the total wait across `max_retries` retries.
    fn total_wait(&self, max_retries: u32) -> Duration {
        (0..max_retries).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.wait(attempt))
        })
    }
}

impl<B: BackoffSchedule + ?Sized> BackoffSchedule for Arc<B> {
    fn wait(&self, attempt: u32) -> Duration {
        (**self).wait(attempt)
    }
}

impl<B: BackoffSchedule + ?Sized> BackoffSchedule for Box<B> {
    fn wait(&self, attempt: u32) -> Duration {
        (**self).wait(attempt)
    }
}

/// Schedule backed by a plain function.
///
/// Built with [`backoff_fn`].
#[derive(Clone)]
pub struct FnBackoff<F>(F);

impl<F> std::fmt::Debug for FnBackoff<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnBackoff")
    }
}

impl<F> BackoffSchedule for FnBackoff<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn wait(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }
}

/// Use a function as a backoff schedule.
///
/// ```rust
/// use steadycall_core::retry::{backoff_fn, BackoffSchedule};
/// use std::time::Duration;
///
/// let constant = backoff_fn(|_| Duration::from_millis(250));
/// assert_eq!(constant.wait(7), Duration::from_millis(250));
/// ```
pub fn backoff_fn<F>(f: F) -> FnBackoff<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    FnBackoff(f)
}
