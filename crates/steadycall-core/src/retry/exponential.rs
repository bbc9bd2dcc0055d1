//! Exponential backoff with jitter, a pluggable alternative to the default.

use super::strategy::BackoffSchedule;
use std::time::Duration;

/// Exponential backoff: `base * factor^attempt`, capped, with optional jitter.
///
/// # Formula
///
/// ```text
/// raw    = base * factor^attempt
/// capped = min(raw, cap)
/// wait   = capped * (1 + jitter * r),  r uniform in [-1, 1]
/// ```
///
/// The jittered result never exceeds `cap`. With `jitter = 0` the schedule is
/// deterministic and non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    base: Duration,
    factor: f64,
    cap: Duration,
    jitter: f64,
}

impl Default for ExponentialBackoff {
    /// 1s base, factor 2, 60s cap, 10% jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(60),
            jitter: 0.1,
        }
    }
}

impl ExponentialBackoff {
    /// Start a builder.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    fn capped(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base.as_secs_f64() * self.factor.powi(exponent);
        // powi overflows to inf for large attempts; min() keeps it finite.
        raw.min(self.cap.as_secs_f64())
    }
}

impl BackoffSchedule for ExponentialBackoff {
    fn wait(&self, attempt: u32) -> Duration {
        let capped = self.capped(attempt);
        let jittered = if self.jitter > 0.0 {
            let spread = rand::random::<f64>() * 2.0 - 1.0;
            capped * (1.0 + self.jitter * spread)
        } else {
            capped
        };
        // Caps near Duration::MAX do not survive the f64 round trip.
        Duration::try_from_secs_f64(jittered.clamp(0.0, self.cap.as_secs_f64()))
            .unwrap_or(self.cap)
    }
}

/// Builder for [`ExponentialBackoff`].
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    base: Option<Duration>,
    factor: Option<f64>,
    cap: Option<Duration>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// First wait. Default: 1s.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = Some(base);
        self
    }

    /// Growth factor per attempt, at least 1.0. Default: 2.0.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor.max(1.0));
        self
    }

    /// Upper bound on any single wait. Default: 60s.
    pub fn cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Jitter fraction, clamped to `0.0..=1.0`. Default: 0.1.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the schedule.
    pub fn build(self) -> ExponentialBackoff {
        let defaults = ExponentialBackoff::default();
        ExponentialBackoff {
            base: self.base.unwrap_or(defaults.base),
            factor: self.factor.unwrap_or(defaults.factor),
            cap: self.cap.unwrap_or(defaults.cap),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}
