//! HTTP transport
//!
//! Unary calls over `reqwest`, with the protocol status read from the
//! `grpc-status` header, and a `tower` layer that applies the retry engine
//! to any HTTP service.

pub mod client;
pub mod layer;
pub mod status;

pub use client::{HttpConnector, HttpConnectorConfig, HttpStub, UnaryRequest};
pub use layer::{RetryLayer, RetryService};
pub use status::{GRPC_MESSAGE, GRPC_STATUS, protocol_status, protocol_status_of, response_failure};
