//! # steadycall
//!
//! Resilient unary RPC calls:
//! - Failures classified as transient or fatal
//! - Bounded retries with a linear backoff (`3s + attempt`)
//! - Stub rebuilds after protocol-level failures, reconnects after
//!   transport-level ones
//! - Fresh per-attempt deadlines and caller cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use steadycall::{ClientConfig, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::http(ClientConfig::with_endpoint("http://localhost:5001"))?;
//!
//!     let reply: serde_json::Value = client
//!         .unary_json("greeter.Greeter/SayHello", &serde_json::json!({ "name": "world" }))
//!         .await?;
//!
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! Any transport can be plugged in by implementing
//! [`Connector`](steadycall_transport::Connector) and passing a continuation
//! to [`Client::invoke`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Re-export commonly used types
pub use client::{Client, ClientBuilder, HttpClient, Response};
pub use config::ClientConfig;
pub use error::{Error, Result};

// Module declarations
pub mod client;
pub mod config;
pub mod error;
pub mod logging;

/// Convenient re-exports of commonly used items.
pub mod prelude {
    pub use crate::client::{Client, ClientBuilder, HttpClient, Response};
    pub use crate::config::ClientConfig;
    pub use crate::error::{Error, Result};
    pub use steadycall_core::prelude::*;
    pub use steadycall_transport::{
        ConnectionManager, Connector, StubHandle, UnaryRequest, UnaryResponse,
    };
    pub use tokio_util::sync::CancellationToken;
}
