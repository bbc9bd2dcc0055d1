#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core of the steadycall resilient-call primitive.
//!
//! This crate is transport-agnostic. It provides:
//!
//! - **Call outcomes** via [`CallOutcome`] and [`Failure`]
//! - **Error classification** via the [`Classify`] trait and the
//!   table-driven [`RetryClassifier`]
//! - **Backoff schedules** via [`BackoffSchedule`](retry::BackoffSchedule)
//!   - Linear-additive default (`3s + attempt`)
//!   - Jittered exponential alternative
//! - **The retry policy engine** via [`RetryEngine`](retry::RetryEngine),
//!   with cancellation and a retry hook
//! - **Per-attempt deadlines** via [`Deadline`]
//! - **Retry event sinks** via [`RetrySink`](observe::RetrySink)
//!
//! # Examples
//!
//! ```rust
//! use steadycall_core::prelude::*;
//!
//! let failure = Failure::protocol(Code::Unavailable, "shutting down");
//! let decision = RetryClassifier::default().classify(&failure);
//! assert!(decision.is_retryable());
//! assert_eq!(decision.rebuild(), Rebuild::Stub);
//! ```

pub mod classify;
pub mod deadline;
pub mod observe;
pub mod outcome;
pub mod retry;
pub mod status;

pub use classify::{Classify, Rebuild, RetryClassifier, RetryDecision, classify, is_transient_http};
pub use deadline::Deadline;
pub use outcome::{CallOutcome, Failure, ProtocolStatus, ResponseStatus, TransportFault};
pub use status::{Code, SocketErrorKind};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use steadycall_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::classify::{Classify, Rebuild, RetryClassifier, RetryDecision};
    pub use crate::deadline::Deadline;
    pub use crate::observe::{NoopSink, RetryEvent, RetrySink, TerminalEvent};
    #[cfg(feature = "tracing")]
    pub use crate::observe::TracingSink;
    pub use crate::outcome::{CallOutcome, Failure};
    pub use crate::retry::{
        AttemptContext, BackoffSchedule, ExponentialBackoff, LinearBackoff, RetryEngine,
        RetryReport,
    };
    pub use crate::status::{Code, SocketErrorKind};
}
