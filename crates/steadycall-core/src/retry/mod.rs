//! Retry policy engine and backoff schedules.
//!
//! # Key Types
//!
//! - [`RetryEngine`] - runs an operation with classification-driven retries
//! - [`BackoffSchedule`] - maps a retry index to a wait
//! - [`LinearBackoff`] - the default `3s + attempt` schedule
//! - [`ExponentialBackoff`] - jittered exponential alternative
//! - [`AttemptContext`] - per-call attempt counter handed to each attempt
//!
//! # Examples
//!
//! ```rust
//! use steadycall_core::retry::{RetryEngine, LinearBackoff};
//! use steadycall_core::{CallOutcome, Code, Failure};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let engine = RetryEngine::builder()
//!     .max_retries(3)
//!     .backoff(LinearBackoff::new(Duration::from_millis(10), Duration::from_millis(10)))
//!     .build();
//!
//! let report = engine
//!     .run(
//!         |_ctx| async { Err::<(), _>(Failure::protocol(Code::InvalidArgument, "bad name")) },
//!         |event| async move { println!("retrying after {:?}", event.wait) },
//!     )
//!     .await;
//!
//! assert_eq!(report.attempts, 1);
//! # }
//! ```

mod context;
mod engine;
mod exponential;
mod linear;
mod strategy;

pub use context::AttemptContext;
pub use engine::{DEFAULT_MAX_RETRIES, RetryEngine, RetryEngineBuilder, RetryReport};
pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use linear::{DEFAULT_BASE, DEFAULT_STEP, LinearBackoff, LinearBackoffBuilder};
pub use strategy::{BackoffSchedule, FnBackoff, backoff_fn};
