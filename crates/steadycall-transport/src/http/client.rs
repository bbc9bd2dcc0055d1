//! HTTP unary transport.
//!
//! A `reqwest::Client` is the connection handle: it owns the connection pool,
//! so rebuilding the connection drops every pooled socket. The stub is a
//! cheap clone of that client plus the endpoint's base URL.

use super::status::response_failure;
use crate::error::{Result, TransportError};
use crate::interceptor::UnaryResponse;
use crate::traits::Connector;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as ReqwestClient;
use std::sync::Arc;
use std::time::Duration;
use steadycall_core::{Code, Deadline, Failure, TransportFault};
use url::Url;

/// HTTP connector configuration.
#[derive(Clone, Debug)]
pub struct HttpConnectorConfig {
    /// Base URL; call paths are resolved against it.
    pub base_url: Url,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Headers sent with every request
    pub default_headers: HeaderMap,

    /// Speak HTTP/2 without negotiation (h2c)
    pub http2_prior_knowledge: bool,
}

impl HttpConnectorConfig {
    /// Configuration for `endpoint` with default settings.
    ///
    /// # Errors
    ///
    /// Fails if `endpoint` is not an absolute `http` or `https` URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base_url(endpoint)?,
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            default_headers: HeaderMap::new(),
            http2_prior_knowledge: false,
        })
    }

    /// Set the connection timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a header sent with every request
    #[must_use]
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Use HTTP/2 prior knowledge
    #[must_use]
    pub fn with_http2_prior_knowledge(mut self) -> Self {
        self.http2_prior_knowledge = true;
        self
    }
}

/// Parse an endpoint into a base URL that paths can be joined onto.
pub(crate) fn parse_base_url(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint).map_err(|source| TransportError::InvalidUrl {
        url: endpoint.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Builds `reqwest` clients for one endpoint.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    config: HttpConnectorConfig,
}

impl HttpConnector {
    /// Create a connector for `config`.
    pub fn new(config: HttpConnectorConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &HttpConnectorConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for HttpConnector {
    type Connection = ReqwestClient;
    type Stub = HttpStub;

    async fn connect(&self) -> std::result::Result<ReqwestClient, TransportFault> {
        let mut builder = ReqwestClient::builder()
            .connect_timeout(self.config.connect_timeout)
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .default_headers(self.config.default_headers.clone());
        if self.config.http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }
        builder
            .build()
            .map_err(|e| TransportFault::from_error_chain(&e))
    }

    fn stub(&self, connection: &Arc<ReqwestClient>) -> HttpStub {
        HttpStub {
            client: ReqwestClient::clone(connection),
            base_url: self.config.base_url.clone(),
        }
    }
}

/// One unary HTTP request.
#[derive(Clone, Debug)]
pub struct UnaryRequest {
    /// Path relative to the base URL.
    pub path: String,
    /// Request body.
    pub body: Bytes,
    /// Extra request headers.
    pub headers: HeaderMap,
}

impl UnaryRequest {
    /// Request for `path` with `body`.
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Issues unary calls over one `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpStub {
    client: ReqwestClient,
    base_url: Url,
}

impl HttpStub {
    /// The base URL calls are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST `request` and resolve it to an outcome.
    ///
    /// The request is bounded by `deadline`. A timeout becomes
    /// `DeadlineExceeded`, a connect or I/O error becomes a transport
    /// failure, and any response other than `200 OK` with an `OK` protocol
    /// status becomes a response failure.
    pub async fn unary(&self, request: UnaryRequest, deadline: Deadline) -> UnaryResponse<Bytes> {
        let url = match self.base_url.join(request.path.trim_start_matches('/')) {
            Ok(url) => url,
            Err(e) => {
                return UnaryResponse::failed(Failure::protocol(
                    Code::InvalidArgument,
                    format!("invalid call path {:?}: {e}", request.path),
                ));
            }
        };

        let sent = self
            .client
            .post(url)
            .headers(request.headers)
            .body(request.body)
            .timeout(deadline.remaining())
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(e) => return UnaryResponse::failed(request_failure(&e)),
        };

        let headers = response.headers().clone();
        if let Some(failure) = response_failure(response.status(), &headers) {
            tracing::debug!(status = %response.status(), error = %failure, "unary call failed");
            return UnaryResponse::failed(failure).with_headers(headers);
        }

        let outcome = response.bytes().await.map_err(|e| request_failure(&e));
        UnaryResponse::new(outcome).with_headers(headers)
    }
}

fn request_failure(err: &reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::deadline_exceeded()
    } else {
        Failure::no_response(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = parse_base_url("http://localhost:5001/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5001/api/");
        assert_eq!(
            url.join("greeter.Greeter/SayHello").unwrap().as_str(),
            "http://localhost:5001/api/greeter.Greeter/SayHello"
        );
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_base_url("ftp://localhost"),
            Err(TransportError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }

    #[tokio::test]
    async fn test_stub_shares_connection_pool() {
        let connector = HttpConnector::new(HttpConnectorConfig::new("https://localhost:5001").unwrap());
        let connection = Arc::new(connector.connect().await.unwrap());
        let stub = connector.stub(&connection);
        assert_eq!(stub.base_url().as_str(), "https://localhost:5001/");
    }
}
