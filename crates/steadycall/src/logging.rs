//! Logging bootstrap.
//!
//! The client reports through `tracing`; installing a subscriber is left to
//! the application. [`init_tracing`] is a convenience for binaries and tests.

pub use steadycall_core::observe::TracingSink;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,steadycall=debug";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`].
///
/// # Errors
///
/// Returns [`Error::Config`](crate::Error::Config) if a global subscriber is
/// already installed.
#[cfg(feature = "trace")]
pub fn init_tracing() -> crate::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("tracing subscriber: {e}")))
}
