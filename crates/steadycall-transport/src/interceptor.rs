//! Call interceptor.
//!
//! Wraps one unary call so the retry engine drives it. The interceptor does
//! not know how to talk to the network: a continuation issues exactly one
//! physical call against the stub it is handed, and retrying means calling
//! the continuation again with a fresh stub and a fresh deadline.

use crate::connection::{ConnectionManager, StubHandle};
use crate::traits::Connector;
use http::HeaderMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use steadycall_core::observe::{NoopSink, RetryEvent, RetrySink};
use steadycall_core::retry::{BackoffSchedule, LinearBackoff, RetryEngine, RetryReport};
use steadycall_core::{
    CallOutcome, Classify, Deadline, Failure, Rebuild, RetryClassifier, SocketErrorKind,
};
use tokio_util::sync::CancellationToken;

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of one physical unary call, with the metadata it carried.
#[derive(Debug, Clone)]
pub struct UnaryResponse<T> {
    /// The attempt's outcome.
    pub outcome: CallOutcome<T>,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response trailers.
    pub trailers: HeaderMap,
}

impl<T> UnaryResponse<T> {
    /// Response with an outcome and no metadata.
    pub fn new(outcome: CallOutcome<T>) -> Self {
        Self {
            outcome,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
        }
    }

    /// Failed response with no metadata.
    pub fn failed(failure: Failure) -> Self {
        Self::new(Err(failure))
    }

    /// Attach headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach trailers.
    #[must_use]
    pub fn with_trailers(mut self, trailers: HeaderMap) -> Self {
        self.trailers = trailers;
        self
    }
}

/// Result of an intercepted logical call.
///
/// `headers` and `trailers` come from the physical call that produced the
/// final outcome. They are empty when no attempt ran or when cancellation
/// dropped the final attempt before it answered.
#[derive(Debug, Clone)]
pub struct Intercepted<T> {
    /// What the engine reported.
    pub report: RetryReport<T>,
    /// Headers of the final attempt.
    pub headers: HeaderMap,
    /// Trailers of the final attempt.
    pub trailers: HeaderMap,
}

impl<T> Intercepted<T> {
    /// The final outcome.
    pub fn into_outcome(self) -> CallOutcome<T> {
        self.report.outcome
    }
}

/// Applies the retry engine to every call routed through it.
///
/// Holds the connection manager weakly; the owner of the manager (normally
/// the client) decides its lifetime. Once the manager is gone every attempt
/// fails with a `closed` transport fault.
pub struct RetryInterceptor<C: Connector, K = RetryClassifier, B = LinearBackoff> {
    manager: Weak<ConnectionManager<C>>,
    engine: RetryEngine<K, B>,
    sink: Arc<dyn RetrySink>,
    attempt_timeout: Duration,
}

impl<C: Connector, K: Clone, B: Clone> Clone for RetryInterceptor<C, K, B> {
    fn clone(&self) -> Self {
        Self {
            manager: Weak::clone(&self.manager),
            engine: self.engine.clone(),
            sink: Arc::clone(&self.sink),
            attempt_timeout: self.attempt_timeout,
        }
    }
}

impl<C: Connector, K: fmt::Debug, B: fmt::Debug> fmt::Debug for RetryInterceptor<C, K, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor")
            .field("engine", &self.engine)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> RetryInterceptor<C> {
    /// Interceptor with the default engine and no event sink.
    pub fn with_defaults(manager: &Arc<ConnectionManager<C>>) -> Self {
        Self::new(manager, RetryEngine::default())
    }
}

impl<C, K, B> RetryInterceptor<C, K, B>
where
    C: Connector,
    K: Classify,
    B: BackoffSchedule,
{
    /// Create an interceptor for `manager`.
    pub fn new(manager: &Arc<ConnectionManager<C>>, engine: RetryEngine<K, B>) -> Self {
        Self {
            manager: Arc::downgrade(manager),
            engine,
            sink: Arc::new(NoopSink),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Report retries and terminal failures to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Bound every physical call by `timeout`, measured from the start of
    /// that attempt.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// The engine in use.
    pub fn engine(&self) -> &RetryEngine<K, B> {
        &self.engine
    }

    /// The per-attempt timeout.
    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run one logical call.
    ///
    /// `continuation` performs one physical call with the current stub, a
    /// clone of `request` and the attempt's deadline. It is invoked once per
    /// attempt. Between attempts the stub or the connection is rebuilt,
    /// depending on how the failure was classified.
    pub async fn intercept<Req, T, F, Fut>(
        &self,
        request: Req,
        cancel: &CancellationToken,
        continuation: F,
    ) -> Intercepted<T>
    where
        Req: Clone,
        F: Fn(Arc<StubHandle<C>>, Req, Deadline) -> Fut,
        Fut: Future<Output = UnaryResponse<T>>,
    {
        let metadata = Mutex::new((HeaderMap::new(), HeaderMap::new()));
        let request = &request;
        let continuation = &continuation;
        let metadata_ref = &metadata;

        let report = self
            .engine
            .run_cancellable(
                cancel,
                move |_ctx| async move {
                    *metadata_ref.lock().unwrap_or_else(PoisonError::into_inner) =
                        (HeaderMap::new(), HeaderMap::new());
                    let response = self.attempt(request.clone(), continuation).await;
                    *metadata_ref.lock().unwrap_or_else(PoisonError::into_inner) =
                        (response.headers, response.trailers);
                    response.outcome
                },
                move |event: RetryEvent| async move {
                    self.sink.on_retry(&event);
                    self.rebuild(event.decision.rebuild()).await;
                },
            )
            .await;

        if let Some(event) = report.terminal_event() {
            self.sink.on_terminal(&event);
        }

        let (headers, trailers) = metadata.into_inner().unwrap_or_else(PoisonError::into_inner);
        Intercepted {
            report,
            headers,
            trailers,
        }
    }

    async fn attempt<Req, T, F, Fut>(&self, request: Req, continuation: &F) -> UnaryResponse<T>
    where
        F: Fn(Arc<StubHandle<C>>, Req, Deadline) -> Fut,
        Fut: Future<Output = UnaryResponse<T>>,
    {
        let Some(manager) = self.manager.upgrade() else {
            return UnaryResponse::failed(Failure::transport(
                SocketErrorKind::Closed,
                "connection manager dropped",
            ));
        };
        let stub = match manager.current_stub().await {
            Ok(stub) => stub,
            Err(failure) => return UnaryResponse::failed(failure),
        };
        drop(manager);

        let deadline = Deadline::after(self.attempt_timeout);
        match tokio::time::timeout_at(deadline.instant(), continuation(stub, request, deadline))
            .await
        {
            Ok(response) => response,
            Err(_) => UnaryResponse::failed(Failure::deadline_exceeded()),
        }
    }

    async fn rebuild(&self, rebuild: Rebuild) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let result = match rebuild {
            Rebuild::None => return,
            Rebuild::Stub => manager.rebuild_stub().await,
            Rebuild::Connection => manager.rebuild_connection().await,
        };
        // A failed rebuild is left in the manager and becomes the next
        // attempt's outcome.
        if let Err(fault) = result {
            tracing::warn!(?rebuild, error = %fault, "rebuild before retry failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::HeaderValue;
    use std::sync::atomic::{AtomicU32, Ordering};
    use steadycall_core::observe::TerminalEvent;
    use steadycall_core::{Code, TransportFault};

    #[derive(Default)]
    struct Fake {
        connects: AtomicU32,
        stubs: AtomicU32,
    }

    #[async_trait]
    impl Connector for Fake {
        type Connection = u32;
        type Stub = u32;

        async fn connect(&self) -> Result<u32, TransportFault> {
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) + 1)
        }

        fn stub(&self, _connection: &Arc<u32>) -> u32 {
            self.stubs.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    mockall::mock! {
        Sink {}
        impl RetrySink for Sink {
            fn on_retry(&self, event: &RetryEvent);
            fn on_terminal(&self, event: &TerminalEvent);
        }
    }

    fn fast_engine(max_retries: u32) -> RetryEngine {
        RetryEngine::builder()
            .max_retries(max_retries)
            .backoff(LinearBackoff::new(Duration::from_millis(10), Duration::ZERO))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_rebuilds_connection() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(3));
        let seen = Mutex::new(Vec::new());

        let result = interceptor
            .intercept("req", &CancellationToken::new(), |stub, req, _deadline| {
                seen.lock().unwrap().push(stub.connection_generation());
                let outcome = if stub.connection_generation() == 1 {
                    Err(Failure::transport(SocketErrorKind::ConnectionRefused, "refused"))
                } else {
                    Ok(req.len())
                };
                async move { UnaryResponse::new(outcome) }
            })
            .await;

        assert_eq!(result.into_outcome(), Ok(3));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_failure_rebuilds_stub_only() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(3));

        let result = interceptor
            .intercept((), &CancellationToken::new(), |stub, (), _| {
                let outcome = if stub.stub_generation() < 2 {
                    Err(Failure::protocol(Code::Unavailable, "busy"))
                } else {
                    Ok(*stub.stub())
                };
                async move { UnaryResponse::new(outcome) }
            })
            .await;

        assert_eq!(result.report.attempts, 3);
        assert_eq!(result.into_outcome(), Ok(3));
        assert_eq!(manager.connector().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_hits_deadline_and_retries() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(1))
            .with_attempt_timeout(Duration::from_millis(100));
        let calls = AtomicU32::new(0);

        let result = interceptor
            .intercept((), &CancellationToken::new(), |_, (), deadline| {
                let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    assert!(deadline.remaining() <= Duration::from_millis(100));
                    if first {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    UnaryResponse::new(Ok("late"))
                }
            })
            .await;

        assert_eq!(result.report.attempts, 2);
        assert_eq!(result.into_outcome(), Ok("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_come_from_final_attempt() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(3));
        let calls = AtomicU32::new(0);

        let result = interceptor
            .intercept((), &CancellationToken::new(), |_, (), _| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let mut headers = HeaderMap::new();
                headers.insert("x-attempt", HeaderValue::from(n));
                let outcome = if n == 0 {
                    Err(Failure::protocol(Code::Internal, "boom"))
                } else {
                    Ok(())
                };
                async move { UnaryResponse::new(outcome).with_headers(headers) }
            })
            .await;

        assert_eq!(result.headers["x-attempt"], "1");
        assert!(result.trailers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_attempt_leaves_no_stale_headers() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(3));
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = interceptor
            .intercept((), &cancel, |_, (), _| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let cancel = cancel.clone();
                async move {
                    if n == 0 {
                        let mut headers = HeaderMap::new();
                        headers.insert("x-attempt", HeaderValue::from(n));
                        return UnaryResponse::failed(Failure::protocol(Code::Internal, "boom"))
                            .with_headers(headers);
                    }
                    cancel.cancel();
                    std::future::pending::<UnaryResponse<()>>().await
                }
            })
            .await;

        assert_eq!(result.report.attempts, 2);
        assert_eq!(result.report.outcome, Err(Failure::Cancelled));
        assert!(result.headers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_manager_fails_closed() {
        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor = RetryInterceptor::new(&manager, fast_engine(3));
        drop(manager);

        let result = interceptor
            .intercept((), &CancellationToken::new(), |_, (), _| async {
                UnaryResponse::new(Ok(()))
            })
            .await;

        assert_eq!(result.report.attempts, 1);
        assert!(matches!(
            result.into_outcome(),
            Err(Failure::Transport(TransportFault { kind: SocketErrorKind::Closed, .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_sees_each_retry_and_the_terminal_failure() {
        let mut sink = MockSink::new();
        sink.expect_on_retry()
            .times(2)
            .withf(|event| event.wait == Duration::from_millis(10))
            .return_const(());
        sink.expect_on_terminal()
            .times(1)
            .withf(|event| event.exhausted && event.attempts == 3)
            .return_const(());

        let manager = Arc::new(ConnectionManager::new(Fake::default()));
        let interceptor =
            RetryInterceptor::new(&manager, fast_engine(2)).with_sink(Arc::new(sink));

        let outcome = interceptor
            .intercept((), &CancellationToken::new(), |_, (), _| async {
                UnaryResponse::<()>::failed(Failure::protocol(Code::Unavailable, "down"))
            })
            .await
            .into_outcome();

        assert_eq!(outcome, Err(Failure::protocol(Code::Unavailable, "down")));
    }
}
