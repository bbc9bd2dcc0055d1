//! Protocol status codes and socket-level failure kinds.
//!
//! These are the two vocabularies the classifier speaks: [`Code`] for
//! outcomes reported by the remote service, [`SocketErrorKind`] for failures
//! to reach it at all.

use std::fmt;
use std::io;
use std::str::FromStr;

/// gRPC status code carried by a protocol-level outcome.
///
/// Discriminants match the wire values sent in the `grpc-status` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Code {
    /// The call completed successfully.
    Ok = 0,
    /// The call was cancelled, typically by the caller.
    Cancelled = 1,
    /// Unknown error, including status values this client does not recognise.
    Unknown = 2,
    /// The client supplied an invalid argument.
    InvalidArgument = 3,
    /// The deadline expired before the call could complete.
    DeadlineExceeded = 4,
    /// The requested entity was not found.
    NotFound = 5,
    /// The entity the client tried to create already exists.
    AlreadyExists = 6,
    /// The caller lacks permission for the operation.
    PermissionDenied = 7,
    /// A resource (quota, memory, ...) has been exhausted.
    ResourceExhausted = 8,
    /// The system is not in a state required for the operation.
    FailedPrecondition = 9,
    /// The operation was aborted, typically due to a concurrency conflict.
    Aborted = 10,
    /// The operation was attempted past the valid range.
    OutOfRange = 11,
    /// The operation is not implemented by the server.
    Unimplemented = 12,
    /// Internal server error.
    Internal = 13,
    /// The service is currently unavailable.
    Unavailable = 14,
    /// Unrecoverable data loss or corruption.
    DataLoss = 15,
    /// The request lacks valid authentication credentials.
    Unauthenticated = 16,
}

impl Code {
    /// Map a wire value to a code. Values outside the known range become
    /// [`Code::Unknown`].
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Parse the textual value of a `grpc-status` header.
    ///
    /// Returns `None` when the value is not an integer at all; such a header
    /// cannot be trusted to say anything about the call.
    pub fn from_header(value: &str) -> Option<Self> {
        value.trim().parse::<i32>().ok().map(Self::from_i32)
    }

    /// The wire value of this code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Canonical upper-snake name, e.g. `DEADLINE_EXCEEDED`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not a valid integer code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status code: {0:?}")]
pub struct ParseCodeError(String);

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_header(s).ok_or_else(|| ParseCodeError(s.to_string()))
    }
}

/// Socket-level failure kind of a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketErrorKind {
    /// The local address could not be assigned.
    AddressNotAvailable,
    /// The remote end actively refused the connection.
    ConnectionRefused,
    /// Name resolution failed.
    HostNotFound,
    /// No route to the remote host.
    HostUnreachable,
    /// The remote host is down.
    HostDown,
    /// The network itself is unreachable.
    NetworkUnreachable,
    /// The connection was reset by the peer.
    ConnectionReset,
    /// The connection was aborted locally.
    ConnectionAborted,
    /// Connecting or reading timed out at the socket level.
    TimedOut,
    /// The connection handle was already shut down.
    Closed,
    /// Anything else.
    Other,
}

// Linux errno for EHOSTDOWN; std has no stable ErrorKind for it.
const EHOSTDOWN: i32 = 112;

impl SocketErrorKind {
    /// Classify an I/O error.
    ///
    /// DNS failures surface from the resolver as uncategorised errors whose
    /// message starts with "failed to lookup address", so the message is
    /// consulted when the kind alone says nothing.
    pub fn from_io_error(err: &io::Error) -> Self {
        if cfg!(target_os = "linux") && err.raw_os_error() == Some(EHOSTDOWN) {
            return Self::HostDown;
        }
        match Self::from(err.kind()) {
            Self::Other if err.to_string().contains("failed to lookup address") => {
                Self::HostNotFound
            }
            kind => kind,
        }
    }

    /// Short kebab-case name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddressNotAvailable => "address-not-available",
            Self::ConnectionRefused => "connection-refused",
            Self::HostNotFound => "host-not-found",
            Self::HostUnreachable => "host-unreachable",
            Self::HostDown => "host-down",
            Self::NetworkUnreachable => "network-unreachable",
            Self::ConnectionReset => "connection-reset",
            Self::ConnectionAborted => "connection-aborted",
            Self::TimedOut => "timed-out",
            Self::Closed => "closed",
            Self::Other => "other",
        }
    }
}

impl From<io::ErrorKind> for SocketErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::AddrNotAvailable => Self::AddressNotAvailable,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::HostUnreachable => Self::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => Self::NetworkUnreachable,
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            io::ErrorKind::ConnectionAborted => Self::ConnectionAborted,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => Self::Closed,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for SocketErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
