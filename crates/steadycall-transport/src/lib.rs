//! Transport side of the steadycall resilient-call primitive
//!
//! Applies the retry engine from `steadycall-core` at the transport
//! boundary. Call sites keep issuing ordinary unary calls; retries, backoff
//! and reconnects happen underneath.

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Architecture
//!
//! - **Connector trait**: how to open a connection and build a stub on it
//! - **Connection manager**: owns the connection and stub, swaps them
//!   atomically on rebuild
//! - **Call interceptor**: runs each call through the engine, rebuilding the
//!   stub or the connection between attempts
//! - **HTTP transport**: unary calls via reqwest, plus a tower retry layer
//! - **Error handling**: setup errors only; call failures are outcomes
//!
//! # Usage
//!
//! ```ignore
//! use steadycall_transport::http::{HttpConnector, HttpConnectorConfig, UnaryRequest};
//! use steadycall_transport::{ConnectionManager, RetryInterceptor};
//!
//! let connector = HttpConnector::new(HttpConnectorConfig::new("http://localhost:5001")?);
//! let manager = Arc::new(ConnectionManager::new(connector));
//! let interceptor = RetryInterceptor::with_defaults(&manager);
//! let request = UnaryRequest::new("greeter.Greeter/SayHello", body);
//! let result = interceptor
//!     .intercept(request, &cancel, |stub, req, deadline| async move {
//!         stub.unary(req, deadline).await
//!     })
//!     .await;
//! ```

pub mod connection;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod traits;

// Re-export commonly used types
pub use connection::{ConnectionManager, StubHandle};
pub use error::{Result, TransportError};
pub use http::{HttpConnector, HttpConnectorConfig, HttpStub, RetryLayer, UnaryRequest};
pub use interceptor::{DEFAULT_ATTEMPT_TIMEOUT, Intercepted, RetryInterceptor, UnaryResponse};
pub use traits::Connector;
