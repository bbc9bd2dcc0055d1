//! The retry policy engine.

use super::context::AttemptContext;
use super::linear::LinearBackoff;
use super::strategy::BackoffSchedule;
use crate::classify::{Classify, RetryClassifier, RetryDecision};
use crate::observe::{RetryEvent, TerminalEvent};
use crate::outcome::{CallOutcome, Failure};
use std::future::{Future, Ready};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Runs a single-attempt operation up to `max_retries + 1` times.
///
/// The engine itself does no I/O besides the opaque operation and the retry
/// hook; classification is delegated to a [`Classify`] and waits come from a
/// [`BackoffSchedule`].
///
/// # Algorithm
///
/// 1. Run the operation.
/// 2. Success, or a non-retryable classification, ends the call.
/// 3. If the retry budget is spent the last outcome is returned.
/// 4. Otherwise the hook runs with `(failure, attempt, wait)`, the engine
///    sleeps for `wait` and goes back to 1.
///
/// # Examples
///
/// ```rust
/// use steadycall_core::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() {
/// let engine = RetryEngine::builder()
///     .max_retries(2)
///     .backoff(LinearBackoff::new(Duration::from_millis(1), Duration::ZERO))
///     .build();
///
/// let outcome: CallOutcome<u32> = engine
///     .execute(|ctx| async move {
///         if ctx.attempt() < 1 {
///             Err(Failure::protocol(Code::Unavailable, "warming up"))
///         } else {
///             Ok(7)
///         }
///     })
///     .await;
/// assert_eq!(outcome, Ok(7));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryEngine<K = RetryClassifier, B = LinearBackoff> {
    classifier: K,
    backoff: B,
    max_retries: u32,
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self::new(RetryClassifier::default(), LinearBackoff::default(), DEFAULT_MAX_RETRIES)
    }
}

impl RetryEngine {
    /// Start a builder with the default classifier and schedule.
    pub fn builder() -> RetryEngineBuilder {
        RetryEngineBuilder {
            classifier: RetryClassifier::default(),
            backoff: LinearBackoff::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Everything known about a finished logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport<T> {
    /// Final outcome. On failure this is the last attempt's failure, not an
    /// aggregate.
    pub outcome: CallOutcome<T>,
    /// Classification of the final outcome.
    pub decision: RetryDecision,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Total backoff waited.
    pub waited: Duration,
    /// Whether the call ended because the retry budget ran out.
    pub exhausted: bool,
}

impl<T> RetryReport<T> {
    /// The terminal-failure event for this report, if it failed.
    pub fn terminal_event(&self) -> Option<TerminalEvent> {
        self.outcome.as_ref().err().map(|failure| TerminalEvent {
            attempts: self.attempts,
            exhausted: self.exhausted,
            decision: self.decision,
            failure: failure.clone(),
        })
    }

    fn cancelled(attempts: u32, waited: Duration) -> Self {
        Self {
            outcome: Err(Failure::Cancelled),
            decision: RetryDecision::Cancelled,
            attempts,
            waited,
            exhausted: false,
        }
    }
}

fn ignore_retry(_: RetryEvent) -> Ready<()> {
    std::future::ready(())
}

impl<K: Classify, B: BackoffSchedule> RetryEngine<K, B> {
    /// Create an engine from its parts.
    pub fn new(classifier: K, backoff: B, max_retries: u32) -> Self {
        Self {
            classifier,
            backoff,
            max_retries,
        }
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &K {
        &self.classifier
    }

    /// The backoff schedule in use.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `operation` with retries and no hook; returns the final outcome.
    pub async fn execute<T, Op, Fut>(&self, operation: Op) -> CallOutcome<T>
    where
        Op: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        self.run(operation, ignore_retry).await.outcome
    }

    /// Like [`execute`](Self::execute) but aborts on `cancel`.
    pub async fn execute_cancellable<T, Op, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: Op,
    ) -> CallOutcome<T>
    where
        Op: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        self.run_cancellable(cancel, operation, ignore_retry)
            .await
            .outcome
    }

    /// Run `operation` with retries, calling `on_retry` before every wait.
    pub async fn run<T, Op, Fut, Hook, HookFut>(
        &self,
        operation: Op,
        on_retry: Hook,
    ) -> RetryReport<T>
    where
        Op: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
        Hook: FnMut(RetryEvent) -> HookFut,
        HookFut: Future<Output = ()>,
    {
        self.run_cancellable(&CancellationToken::new(), operation, on_retry)
            .await
    }

    /// Run `operation` with retries until it succeeds, fails fatally, runs
    /// out of retries or `cancel` fires.
    ///
    /// Cancellation is observed before the first attempt, while an attempt is
    /// pending (the attempt's future is dropped), while the hook runs and
    /// during the backoff wait. In every case the report's outcome is
    /// [`Failure::Cancelled`] and no further attempt is made.
    pub async fn run_cancellable<T, Op, Fut, Hook, HookFut>(
        &self,
        cancel: &CancellationToken,
        mut operation: Op,
        mut on_retry: Hook,
    ) -> RetryReport<T>
    where
        Op: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
        Hook: FnMut(RetryEvent) -> HookFut,
        HookFut: Future<Output = ()>,
    {
        let mut ctx = AttemptContext::new(self.max_retries);

        if cancel.is_cancelled() {
            return RetryReport::cancelled(0, Duration::ZERO);
        }

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return RetryReport::cancelled(ctx.attempt() + 1, ctx.elapsed_backoff());
                }
                outcome = operation(ctx) => outcome,
            };

            let decision = self.classifier.classify_outcome(&outcome);
            let failure = match outcome {
                Err(failure) if decision.is_retryable() && !ctx.is_last() => failure,
                outcome => {
                    return RetryReport {
                        exhausted: decision.is_retryable(),
                        outcome,
                        decision,
                        attempts: ctx.attempt() + 1,
                        waited: ctx.elapsed_backoff(),
                    };
                }
            };

            let wait = self.backoff.wait(ctx.attempt());
            let event = RetryEvent {
                attempt: ctx.attempt(),
                wait,
                decision,
                failure,
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return RetryReport::cancelled(ctx.attempt() + 1, ctx.elapsed_backoff());
                }
                () = async {
                    on_retry(event).await;
                    tokio::time::sleep(wait).await;
                } => {}
            }

            ctx.advance(wait);
        }
    }
}

/// Builder for [`RetryEngine`].
#[derive(Debug)]
pub struct RetryEngineBuilder<K = RetryClassifier, B = LinearBackoff> {
    classifier: K,
    backoff: B,
    max_retries: u32,
}

impl<K, B> RetryEngineBuilder<K, B> {
    /// Retries after the first attempt. Default: 3.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the classifier.
    pub fn classifier<K2: Classify>(self, classifier: K2) -> RetryEngineBuilder<K2, B> {
        RetryEngineBuilder {
            classifier,
            backoff: self.backoff,
            max_retries: self.max_retries,
        }
    }

    /// Replace the backoff schedule.
    pub fn backoff<B2: BackoffSchedule>(self, backoff: B2) -> RetryEngineBuilder<K, B2> {
        RetryEngineBuilder {
            classifier: self.classifier,
            backoff,
            max_retries: self.max_retries,
        }
    }

    /// Build the engine.
    pub fn build(self) -> RetryEngine<K, B> {
        RetryEngine {
            classifier: self.classifier,
            backoff: self.backoff,
            max_retries: self.max_retries,
        }
    }
}
