//! Error classification.
//!
//! Maps a [`Failure`] to a [`RetryDecision`]. Classification is a pure,
//! total function of the outcome: no history, no hidden state.

use crate::outcome::{CallOutcome, Failure, ResponseStatus};
use crate::status::{Code, SocketErrorKind};
use http::StatusCode;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Socket failures worth retrying.
pub const RETRYABLE_SOCKET_ERRORS: &[SocketErrorKind] = &[
    SocketErrorKind::AddressNotAvailable,
    SocketErrorKind::ConnectionRefused,
    SocketErrorKind::HostNotFound,
    SocketErrorKind::HostUnreachable,
    SocketErrorKind::HostDown,
];

/// Protocol codes worth retrying.
pub const RETRYABLE_STATUS_CODES: &[Code] = &[
    Code::DeadlineExceeded,
    Code::Internal,
    Code::NotFound,
    Code::ResourceExhausted,
    Code::Unavailable,
    Code::Unknown,
];

/// What the retry engine should do with an attempt's outcome.
///
/// The variant is the reason; [`is_retryable`](Self::is_retryable) is the
/// boolean part of the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Terminal success, nothing to retry.
    Success,
    /// Transient network-level failure.
    TransientTransport(SocketErrorKind),
    /// The server reported a recoverable condition.
    TransientProtocol(Code),
    /// Out-of-band response that is transient at the HTTP or protocol level.
    TransientResponse {
        /// HTTP status of the response.
        http: StatusCode,
        /// Embedded protocol status, if readable.
        protocol: Option<Code>,
    },
    /// Network-level failure that retrying will not fix.
    FatalTransport(SocketErrorKind),
    /// Well-formed rejection by the server.
    FatalProtocol(Code),
    /// Out-of-band response that must not be retried.
    FatalResponse {
        /// HTTP status of the response.
        http: StatusCode,
        /// Embedded protocol status, if readable.
        protocol: Option<Code>,
    },
    /// The caller cancelled the call.
    Cancelled,
}

/// Side effect a retry needs before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuild {
    /// Nothing to rebuild.
    None,
    /// Build a fresh stub on the current connection.
    Stub,
    /// Replace the connection, then the stub on top of it.
    Connection,
}

impl RetryDecision {
    /// Whether another attempt should be made.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientTransport(_) | Self::TransientProtocol(_) | Self::TransientResponse { .. }
        )
    }

    /// The rebuild a retry of this outcome calls for.
    ///
    /// Transport failures imply the connection is unusable; other retryable
    /// failures only need a fresh stub.
    pub fn rebuild(&self) -> Rebuild {
        match self {
            Self::TransientTransport(_) => Rebuild::Connection,
            Self::TransientProtocol(_) | Self::TransientResponse { .. } => Rebuild::Stub,
            _ => Rebuild::None,
        }
    }
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::TransientTransport(kind) => write!(f, "transient transport error ({kind})"),
            Self::TransientProtocol(code) => write!(f, "transient status {code}"),
            Self::TransientResponse { http, protocol } => {
                write!(f, "transient response (HTTP {}", http.as_u16())?;
                fmt_protocol(f, *protocol)
            }
            Self::FatalTransport(kind) => write!(f, "fatal transport error ({kind})"),
            Self::FatalProtocol(code) => write!(f, "fatal status {code}"),
            Self::FatalResponse { http, protocol } => {
                write!(f, "fatal response (HTTP {}", http.as_u16())?;
                fmt_protocol(f, *protocol)
            }
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

fn fmt_protocol(f: &mut fmt::Formatter<'_>, protocol: Option<Code>) -> fmt::Result {
    match protocol {
        Some(code) => write!(f, ", status {code})"),
        None => f.write_str(")"),
    }
}

/// Conventional transient-HTTP predicate: server errors and request timeouts.
pub fn is_transient_http(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

/// A failure classifier.
///
/// Implementations must be pure: the same failure always yields the same
/// decision.
pub trait Classify: Send + Sync {
    /// Classify a failed attempt.
    fn classify(&self, failure: &Failure) -> RetryDecision;

    /// Classify a full outcome; success is never retried.
    fn classify_outcome<T>(&self, outcome: &CallOutcome<T>) -> RetryDecision
    where
        Self: Sized,
    {
        match outcome {
            Ok(_) => RetryDecision::Success,
            Err(failure) => self.classify(failure),
        }
    }
}

impl<K: Classify + ?Sized> Classify for Arc<K> {
    fn classify(&self, failure: &Failure) -> RetryDecision {
        (**self).classify(failure)
    }
}

impl<K: Classify + ?Sized> Classify for Box<K> {
    fn classify(&self, failure: &Failure) -> RetryDecision {
        (**self).classify(failure)
    }
}

/// Table-driven classifier.
///
/// Defaults to [`RETRYABLE_SOCKET_ERRORS`] and [`RETRYABLE_STATUS_CODES`].
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    socket_errors: Cow<'static, [SocketErrorKind]>,
    status_codes: Cow<'static, [Code]>,
}

impl Default for RetryClassifier {
    fn default() -> Self {
        Self {
            socket_errors: Cow::Borrowed(RETRYABLE_SOCKET_ERRORS),
            status_codes: Cow::Borrowed(RETRYABLE_STATUS_CODES),
        }
    }
}

impl RetryClassifier {
    /// Classifier with the default tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retryable socket error table.
    pub fn with_socket_errors(mut self, kinds: impl Into<Vec<SocketErrorKind>>) -> Self {
        self.socket_errors = Cow::Owned(kinds.into());
        self
    }

    /// Replace the retryable status code table.
    pub fn with_status_codes(mut self, codes: impl Into<Vec<Code>>) -> Self {
        self.status_codes = Cow::Owned(codes.into());
        self
    }

    /// Whether `code` is in the retryable table.
    pub fn retries_code(&self, code: Code) -> bool {
        self.status_codes.contains(&code)
    }

    /// Whether `kind` is in the retryable table.
    pub fn retries_socket_error(&self, kind: SocketErrorKind) -> bool {
        self.socket_errors.contains(&kind)
    }

    fn classify_response(&self, response: &ResponseStatus) -> RetryDecision {
        let ResponseStatus { http, protocol, .. } = *response;
        // Both conditions are kept as a plain OR; a 5xx carrying a retryable
        // status matches twice and that is fine.
        let protocol_match =
            http == StatusCode::OK && protocol.is_some_and(|code| self.retries_code(code));
        if protocol_match || is_transient_http(http) {
            RetryDecision::TransientResponse { http, protocol }
        } else {
            RetryDecision::FatalResponse { http, protocol }
        }
    }
}

impl Classify for RetryClassifier {
    fn classify(&self, failure: &Failure) -> RetryDecision {
        match failure {
            Failure::Transport(fault) if self.retries_socket_error(fault.kind) => {
                RetryDecision::TransientTransport(fault.kind)
            }
            Failure::Transport(fault) => RetryDecision::FatalTransport(fault.kind),
            Failure::Protocol(status) if self.retries_code(status.code) => {
                RetryDecision::TransientProtocol(status.code)
            }
            Failure::Protocol(status) => RetryDecision::FatalProtocol(status.code),
            Failure::Response(response) => self.classify_response(response),
            Failure::Cancelled => RetryDecision::Cancelled,
        }
    }
}

/// Classify with the default tables.
pub fn classify<T>(outcome: &CallOutcome<T>) -> RetryDecision {
    RetryClassifier::default().classify_outcome(outcome)
}
