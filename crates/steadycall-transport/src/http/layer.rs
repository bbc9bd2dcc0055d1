//! Retry middleware for `tower` HTTP services.
//!
//! The same engine as the interceptor, applied at the HTTP level: a response
//! is judged by its status and its `grpc-status` header, a service error by
//! the I/O error in its source chain. A service error with no I/O error
//! carries no status at all and counts as `Unknown`. When retries end on a response-level
//! failure the last response is handed back unchanged, so the caller still
//! sees the real status and headers.

use super::status::response_failure;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use steadycall_core::observe::{NoopSink, RetryEvent, RetrySink};
use steadycall_core::retry::{BackoffSchedule, LinearBackoff, RetryEngine};
use steadycall_core::{Classify, Failure, RetryClassifier};
use tower::util::ServiceExt;
use tower::{BoxError, Layer, Service};

/// Layer that retries HTTP requests with a [`RetryEngine`].
pub struct RetryLayer<K = RetryClassifier, B = LinearBackoff> {
    engine: Arc<RetryEngine<K, B>>,
    sink: Arc<dyn RetrySink>,
}

impl<K, B> Clone for RetryLayer<K, B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<K: fmt::Debug, B: fmt::Debug> fmt::Debug for RetryLayer<K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryLayer")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<K, B> RetryLayer<K, B> {
    /// Create a layer around `engine`.
    pub fn new(engine: RetryEngine<K, B>) -> Self {
        Self {
            engine: Arc::new(engine),
            sink: Arc::new(NoopSink),
        }
    }

    /// Report retries and terminal failures to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RetrySink>) -> Self {
        self.sink = sink;
        self
    }
}

impl<S, K, B> Layer<S> for RetryLayer<K, B> {
    type Service = RetryService<S, K, B>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
        }
    }
}

/// Service produced by [`RetryLayer`].
pub struct RetryService<S, K = RetryClassifier, B = LinearBackoff> {
    inner: S,
    engine: Arc<RetryEngine<K, B>>,
    sink: Arc<dyn RetrySink>,
}

impl<S: Clone, K, B> Clone for RetryService<S, K, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S, ReqBody, ResBody, K, B> Service<http::Request<ReqBody>> for RetryService<S, K, B>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    ReqBody: Clone + Send + Sync + 'static,
    ResBody: Send + 'static,
    K: Classify + 'static,
    B: BackoffSchedule + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, clone);
        let template = ready.clone();
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let last_response = Mutex::new(None);
            let last = &last_response;
            let mut ready = Some(ready);

            let report = engine
                .run(
                    move |_ctx| {
                        let service = ready.take().unwrap_or_else(|| template.clone());
                        let mut attempt = http::Request::new(body.clone());
                        *attempt.method_mut() = parts.method.clone();
                        *attempt.uri_mut() = parts.uri.clone();
                        *attempt.version_mut() = parts.version;
                        *attempt.headers_mut() = parts.headers.clone();

                        async move {
                            match service.oneshot(attempt).await {
                                Ok(response) => {
                                    match response_failure(response.status(), response.headers()) {
                                        None => Ok(response),
                                        Some(failure) => {
                                            *last.lock().unwrap_or_else(PoisonError::into_inner) =
                                                Some(response);
                                            Err(failure)
                                        }
                                    }
                                }
                                Err(err) => {
                                    let err: BoxError = err.into();
                                    Err(Failure::no_response(&*err))
                                }
                            }
                        }
                    },
                    |event: RetryEvent| {
                        sink.on_retry(&event);
                        std::future::ready(())
                    },
                )
                .await;

            if let Some(event) = report.terminal_event() {
                sink.on_terminal(&event);
            }

            match report.outcome {
                Ok(response) => Ok(response),
                Err(failure @ Failure::Response(_)) => last_response
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .ok_or_else(|| BoxError::from(failure)),
                Err(failure) => Err(BoxError::from(failure)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::convert::Infallible;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use steadycall_core::{Code, SocketErrorKind};

    fn engine() -> RetryEngine {
        RetryEngine::builder()
            .backoff(LinearBackoff::new(Duration::from_millis(5), Duration::ZERO))
            .build()
    }

    fn request() -> http::Request<String> {
        http::Request::post("http://svc/greeter.Greeter/SayHello")
            .header("x-request", "1")
            .body("hello".to_string())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_out_of_band_status_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner = tower::service_fn(move |req: http::Request<String>| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(req.body(), "hello");
                assert_eq!(req.headers()["x-request"], "1");
                let status = if n < 2 { "14" } else { "0" };
                Ok::<_, Infallible>(
                    http::Response::builder()
                        .header("grpc-status", status)
                        .body(n)
                        .unwrap(),
                )
            }
        });

        let response = RetryLayer::new(engine())
            .layer(inner)
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(*response.body(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_response_is_returned_unchanged() {
        let inner = tower::service_fn(|_req: http::Request<String>| async {
            Ok::<_, Infallible>(
                http::Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .header("grpc-message", "draining")
                    .body(())
                    .unwrap(),
            )
        });

        let response = RetryLayer::new(engine())
            .layer(inner)
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["grpc-message"], "draining");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_status_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner = tower::service_fn(move |_req: http::Request<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Ok::<_, Infallible>(
                    http::Response::builder()
                        .header("grpc-status", Code::InvalidArgument.as_i32().to_string())
                        .body(())
                        .unwrap(),
                )
            }
        });

        let response = RetryLayer::new(engine())
            .layer(inner)
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(response.headers()["grpc-status"], "3");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_error_maps_through_io_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner = tower::service_fn(move |_req: http::Request<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<http::Response<()>, _>(io::Error::from(io::ErrorKind::ConnectionRefused)) }
        });

        let err = RetryLayer::new(engine())
            .layer(inner)
            .oneshot(request())
            .await
            .unwrap_err();

        let failure = err.downcast_ref::<Failure>().unwrap();
        assert!(matches!(
            failure,
            Failure::Transport(fault) if fault.kind == SocketErrorKind::ConnectionRefused
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection closed before message completed")]
    struct ConnectionClosed;

    #[tokio::test(start_paused = true)]
    async fn test_service_error_without_socket_kind_is_retried_as_unknown() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner = tower::service_fn(move |_req: http::Request<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<http::Response<()>, _>(ConnectionClosed) }
        });

        let err = RetryLayer::new(engine())
            .layer(inner)
            .oneshot(request())
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<Failure>(),
            Some(&Failure::protocol(
                Code::Unknown,
                "connection closed before message completed"
            ))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
