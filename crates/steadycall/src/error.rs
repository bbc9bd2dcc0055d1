//! Error types for steadycall
//!
//! A logical call either yields its value or exactly one [`Error`]: the last
//! observed failure, tagged with why retrying stopped. Intermediate failures
//! are only visible through the retry sink.

use steadycall_core::retry::RetryReport;
use steadycall_core::{Failure, ProtocolStatus, ResponseStatus, TransportFault};
use steadycall_transport::TransportError;
use thiserror::Error;

/// Result type alias for steadycall operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for steadycall.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure that is not worth retrying.
    #[error("Transport failure: {0}")]
    FatalTransport(TransportFault),

    /// The server rejected the call with a well-formed status.
    #[error("Call rejected: {0}")]
    FatalProtocol(ProtocolStatus),

    /// The server answered with a response that must not be retried.
    #[error("Response rejected: {0}")]
    FatalResponse(ResponseStatus),

    /// The caller cancelled the call.
    #[error("Call cancelled")]
    Cancelled,

    /// Every attempt failed with a retryable failure.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Failure of the last attempt
        last: Failure,
    },

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transport setup error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Request or response body was not valid JSON for the expected type.
    #[error("JSON body error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// Collapse a finished call into its value or its terminal error.
    pub fn from_report<T>(report: RetryReport<T>) -> Result<T> {
        let failure = match report.outcome {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };
        if report.exhausted {
            return Err(Error::Exhausted {
                attempts: report.attempts,
                last: failure,
            });
        }
        Err(Error::from(failure))
    }

    /// Whether the underlying failure was of a transient kind.
    ///
    /// True only for [`Error::Exhausted`]: fatal failures, cancellation and
    /// setup errors are never transient.
    pub fn is_retryable_kind(&self) -> bool {
        matches!(self, Error::Exhausted { .. })
    }

    /// The call failure behind this error, if it came from a call.
    pub fn failure(&self) -> Option<Failure> {
        match self {
            Error::FatalTransport(fault) => Some(Failure::Transport(fault.clone())),
            Error::FatalProtocol(status) => Some(Failure::Protocol(status.clone())),
            Error::FatalResponse(status) => Some(Failure::Response(status.clone())),
            Error::Cancelled => Some(Failure::Cancelled),
            Error::Exhausted { last, .. } => Some(last.clone()),
            Error::Config(_) | Error::Transport(_) | Error::Decode(_) => None,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport(fault) => Error::FatalTransport(fault),
            Failure::Protocol(status) => Error::FatalProtocol(status),
            Failure::Response(status) => Error::FatalResponse(status),
            Failure::Cancelled => Error::Cancelled,
        }
    }
}
