//! Transport error types

/// Result type for transport setup
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while configuring a transport.
///
/// Call failures are not errors of this type; they are reported as
/// [`Failure`](steadycall_core::Failure) outcomes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint is not a valid URL
    #[error("invalid endpoint {url:?}: {source}")]
    InvalidUrl {
        /// The rejected endpoint
        url: String,
        /// Parse failure
        #[source]
        source: url::ParseError,
    },

    /// The endpoint uses a scheme other than http or https
    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}
