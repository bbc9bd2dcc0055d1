//! The resilient client.
//!
//! A [`Client`] owns the connection manager for one endpoint and routes every
//! call through a [`RetryInterceptor`]. From the caller's side `invoke` looks
//! like a plain unary call that sometimes takes longer.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use bytes::Bytes;
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use steadycall_core::observe::{RetrySink, TracingSink};
use steadycall_core::retry::{BackoffSchedule, RetryEngine};
use steadycall_core::{Classify, Deadline, RetryClassifier};
use steadycall_transport::{
    ConnectionManager, Connector, HttpConnector, RetryInterceptor, StubHandle, UnaryRequest,
    UnaryResponse,
};
use tokio_util::sync::CancellationToken;

type DynInterceptor<C> = RetryInterceptor<C, Arc<dyn Classify>, Arc<dyn BackoffSchedule>>;

/// Client that retries unary calls over connections from `C`.
pub struct Client<C: Connector> {
    manager: Arc<ConnectionManager<C>>,
    interceptor: DynInterceptor<C>,
}

/// Client for unary calls over HTTP.
pub type HttpClient = Client<HttpConnector>;

/// Value of a successful call together with its metadata.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The call's value.
    pub value: T,
    /// Headers of the physical call that produced the value.
    pub headers: HeaderMap,
    /// Trailers of the physical call that produced the value.
    pub trailers: HeaderMap,
    /// Attempts it took.
    pub attempts: u32,
}

impl<C: Connector> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("manager", &self.manager)
            .field("max_retries", &self.interceptor.engine().max_retries())
            .field("attempt_timeout", &self.interceptor.attempt_timeout())
            .finish()
    }
}

impl<C: Connector> Client<C> {
    /// Start building a client around `connector`.
    pub fn builder(connector: C) -> ClientBuilder<C> {
        ClientBuilder::new(connector)
    }

    /// The connection manager shared by every call.
    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }

    /// Run one logical call.
    ///
    /// `call` performs a single physical call with the stub it is handed; it
    /// is invoked again for each retry.
    ///
    /// # Errors
    ///
    /// The last failure, as a fatal, exhausted or cancelled [`Error`].
    pub async fn invoke<Req, T, F, Fut>(&self, request: Req, call: F) -> Result<T>
    where
        Req: Clone,
        F: Fn(Arc<StubHandle<C>>, Req, Deadline) -> Fut,
        Fut: Future<Output = UnaryResponse<T>>,
    {
        self.invoke_cancellable(request, &CancellationToken::new(), call)
            .await
    }

    /// Like [`invoke`](Self::invoke), aborting when `cancel` fires.
    ///
    /// Cancelling drops the pending physical call or cuts the backoff wait
    /// short; no further attempt is made.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] on cancellation, otherwise as for `invoke`.
    pub async fn invoke_cancellable<Req, T, F, Fut>(
        &self,
        request: Req,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T>
    where
        Req: Clone,
        F: Fn(Arc<StubHandle<C>>, Req, Deadline) -> Fut,
        Fut: Future<Output = UnaryResponse<T>>,
    {
        let intercepted = self.interceptor.intercept(request, cancel, call).await;
        Error::from_report(intercepted.report)
    }

    /// Like [`invoke_cancellable`](Self::invoke_cancellable), also returning
    /// the headers and trailers of the successful attempt.
    ///
    /// # Errors
    ///
    /// As for `invoke_cancellable`.
    pub async fn invoke_with_metadata<Req, T, F, Fut>(
        &self,
        request: Req,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<Response<T>>
    where
        Req: Clone,
        F: Fn(Arc<StubHandle<C>>, Req, Deadline) -> Fut,
        Fut: Future<Output = UnaryResponse<T>>,
    {
        let intercepted = self.interceptor.intercept(request, cancel, call).await;
        let attempts = intercepted.report.attempts;
        let value = Error::from_report(intercepted.report)?;
        Ok(Response {
            value,
            headers: intercepted.headers,
            trailers: intercepted.trailers,
            attempts,
        })
    }
}

impl HttpClient {
    /// HTTP client for `config`, connecting lazily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration.
    pub fn http(config: ClientConfig) -> Result<Self> {
        let connector = HttpConnector::new(config.http_connector()?);
        Client::builder(connector).config(config).build()
    }

    /// HTTP client configured from the environment.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        Self::http(ClientConfig::from_env()?)
    }

    /// POST `body` to `path` and return the response body.
    ///
    /// # Errors
    ///
    /// As for [`invoke`](Client::invoke).
    pub async fn unary(&self, path: &str, body: impl Into<Bytes>) -> Result<Bytes> {
        self.invoke(UnaryRequest::new(path, body), |stub, request, deadline| async move {
            stub.unary(request, deadline).await
        })
        .await
    }

    /// POST `request` as JSON to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] if either body is not valid JSON for its type,
    /// otherwise as for [`invoke`](Client::invoke).
    pub async fn unary_json<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)?;
        let request = UnaryRequest::new(path, body).with_header(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let bytes = self
            .invoke(request, |stub, request, deadline| async move {
                stub.unary(request, deadline).await
            })
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder<C: Connector> {
    connector: C,
    config: ClientConfig,
    classifier: Option<Arc<dyn Classify>>,
    backoff: Option<Arc<dyn BackoffSchedule>>,
    sink: Option<Arc<dyn RetrySink>>,
}

impl<C: Connector> ClientBuilder<C> {
    /// Builder with default configuration.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            config: ClientConfig::default(),
            classifier: None,
            backoff: None,
            sink: None,
        }
    }

    /// Use `config` for retry budget, backoff and timeouts.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: impl Classify + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Replace the configured linear backoff.
    #[must_use]
    pub fn backoff(mut self, backoff: impl BackoffSchedule + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Report retries to `sink` instead of `tracing`.
    #[must_use]
    pub fn sink(mut self, sink: impl RetrySink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Build a client that connects on its first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration.
    pub fn build(self) -> Result<Client<C>> {
        self.config.validate()?;
        let manager = Arc::new(ConnectionManager::new(self.connector));
        Ok(Self::assemble(
            manager,
            &self.config,
            self.classifier,
            self.backoff,
            self.sink,
        ))
    }

    /// Build a client and connect immediately.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration, or
    /// [`Error::FatalTransport`] if the first connection fails.
    pub async fn connect(self) -> Result<Client<C>> {
        self.config.validate()?;
        let manager = ConnectionManager::connect(self.connector)
            .await
            .map_err(Error::FatalTransport)?;
        Ok(Self::assemble(
            Arc::new(manager),
            &self.config,
            self.classifier,
            self.backoff,
            self.sink,
        ))
    }

    fn assemble(
        manager: Arc<ConnectionManager<C>>,
        config: &ClientConfig,
        classifier: Option<Arc<dyn Classify>>,
        backoff: Option<Arc<dyn BackoffSchedule>>,
        sink: Option<Arc<dyn RetrySink>>,
    ) -> Client<C> {
        let engine = RetryEngine::new(
            classifier.unwrap_or_else(|| Arc::new(RetryClassifier::default())),
            backoff.unwrap_or_else(|| Arc::new(config.backoff())),
            config.max_retries,
        );
        let interceptor = RetryInterceptor::new(&manager, engine)
            .with_sink(sink.unwrap_or_else(|| Arc::new(TracingSink)))
            .with_attempt_timeout(config.attempt_timeout);

        tracing::debug!(
            max_retries = config.max_retries,
            attempt_timeout = ?config.attempt_timeout,
            "client built"
        );
        Client {
            manager,
            interceptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_rejects_invalid_config() {
        let err = HttpClient::http(ClientConfig::with_endpoint("ftp://nowhere")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_http_client_is_lazy() {
        let client = HttpClient::http(ClientConfig::with_endpoint("http://127.0.0.1:1")).unwrap();
        assert_eq!(client.manager().connection_generation(), None);
    }
}
