//! Per-attempt call outcomes.

use crate::status::{Code, SocketErrorKind};
use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Outcome of one physical call attempt.
///
/// Produced once per attempt and never mutated afterwards.
pub type CallOutcome<T> = Result<T, Failure>;

/// Why an attempt did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// The transport could not establish or keep a connection.
    #[error("{0}")]
    Transport(TransportFault),

    /// The remote service answered with a non-OK status.
    #[error("{0}")]
    Protocol(ProtocolStatus),

    /// A transport-layer response carrying its protocol status out of band,
    /// e.g. as a `grpc-status` header on an HTTP response.
    #[error("{0}")]
    Response(ResponseStatus),

    /// The caller cancelled the logical call.
    #[error("call cancelled")]
    Cancelled,
}

impl Failure {
    /// Shorthand for a transport failure.
    pub fn transport(kind: SocketErrorKind, message: impl Into<String>) -> Self {
        Self::Transport(TransportFault::new(kind, message))
    }

    /// Shorthand for a protocol failure.
    pub fn protocol(code: Code, message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolStatus::new(code, message))
    }

    /// Shorthand for an out-of-band response failure.
    pub fn response(http: StatusCode, protocol: Option<Code>) -> Self {
        Self::Response(ResponseStatus::new(http, protocol))
    }

    /// Failure raised when an attempt outlives its deadline.
    pub fn deadline_exceeded() -> Self {
        Self::protocol(Code::DeadlineExceeded, "attempt deadline exceeded")
    }

    /// Failure for an attempt that got no response at all.
    ///
    /// An [`io::Error`] along the source chain makes it a transport failure
    /// of that socket kind. Without one there is no status to read, so the
    /// attempt counts as [`Code::Unknown`].
    pub fn no_response(err: &(dyn StdError + 'static)) -> Self {
        match socket_kind_in_chain(err) {
            Some(kind) => Self::transport(kind, err.to_string()),
            None => Self::protocol(Code::Unknown, err.to_string()),
        }
    }
}

impl From<io::Error> for Failure {
    fn from(err: io::Error) -> Self {
        Self::transport(SocketErrorKind::from_io_error(&err), err.to_string())
    }
}

/// Network-level failure: the call never reached a well-formed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    /// Socket-level kind of the failure.
    pub kind: SocketErrorKind,
    /// Human-readable detail from the transport.
    pub message: String,
}

impl TransportFault {
    /// Create a new transport fault.
    pub fn new(kind: SocketErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a fault from any error, using the first [`io::Error`] found
    /// along its source chain to pick the kind.
    pub fn from_error_chain(err: &(dyn StdError + 'static)) -> Self {
        let kind = socket_kind_in_chain(err).unwrap_or(SocketErrorKind::Other);
        Self::new(kind, err.to_string())
    }
}

fn socket_kind_in_chain(err: &(dyn StdError + 'static)) -> Option<SocketErrorKind> {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            return Some(SocketErrorKind::from_io_error(io_err));
        }
        source = current.source();
    }
    None
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error ({}): {}", self.kind, self.message)
    }
}

/// Status returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolStatus {
    /// Status code.
    pub code: Code,
    /// Status message supplied by the server.
    pub message: String,
}

impl ProtocolStatus {
    /// Create a new protocol status.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "status {}", self.code)
        } else {
            write!(f, "status {}: {}", self.code, self.message)
        }
    }
}

/// HTTP response whose protocol status travels out of band.
///
/// `protocol` is `None` when the embedded status could not be determined
/// (missing on a non-200 response, or not an integer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    /// HTTP status of the response.
    pub http: StatusCode,
    /// Embedded protocol status, if it could be read.
    pub protocol: Option<Code>,
    /// `grpc-message` or equivalent, if present.
    pub message: Option<String>,
}

impl ResponseStatus {
    /// Create a response status without a message.
    pub fn new(http: StatusCode, protocol: Option<Code>) -> Self {
        Self {
            http,
            protocol,
            message: None,
        }
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.http)?;
        match self.protocol {
            Some(code) => write!(f, " with status {code}")?,
            None => f.write_str(" without readable status")?,
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}
