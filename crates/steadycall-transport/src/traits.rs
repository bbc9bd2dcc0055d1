//! The transport seam.
//!
//! A [`Connector`] knows how to establish the long-lived, expensive
//! connection handle and how to build the cheap call stub on top of it. The
//! physical unary call itself is issued by a continuation against the stub,
//! so the transport's request and response types never leak into this crate.

use async_trait::async_trait;
use std::sync::Arc;
use steadycall_core::TransportFault;

/// Establishes connections and builds stubs for one remote endpoint.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use std::sync::Arc;
/// use steadycall_core::TransportFault;
/// use steadycall_transport::Connector;
///
/// struct Loopback;
///
/// #[async_trait]
/// impl Connector for Loopback {
///     type Connection = String;
///     type Stub = Arc<String>;
///
///     async fn connect(&self) -> Result<String, TransportFault> {
///         Ok("loopback".to_string())
///     }
///
///     fn stub(&self, connection: &Arc<String>) -> Arc<String> {
///         Arc::clone(connection)
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The long-lived connection handle.
    type Connection: Send + Sync + 'static;

    /// The lightweight call stub built on a connection.
    type Stub: Send + Sync + 'static;

    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns the transport fault that prevented the connection.
    async fn connect(&self) -> Result<Self::Connection, TransportFault>;

    /// Build a stub on an existing connection. Must be cheap.
    fn stub(&self, connection: &Arc<Self::Connection>) -> Self::Stub;
}
