//! Integration tests for the HTTP transport

use std::sync::Arc;
use std::time::Duration;
use steadycall_core::retry::{LinearBackoff, RetryEngine};
use steadycall_core::{Code, Failure, ResponseStatus};
use steadycall_transport::{
    ConnectionManager, HttpConnector, HttpConnectorConfig, Intercepted, RetryInterceptor,
    UnaryRequest,
};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SAY_HELLO: &str = "/greeter.Greeter/SayHello";

fn engine(max_retries: u32) -> RetryEngine {
    RetryEngine::builder()
        .max_retries(max_retries)
        .backoff(LinearBackoff::new(Duration::from_millis(10), Duration::ZERO))
        .build()
}

async fn call(
    endpoint: &str,
    engine: RetryEngine,
    attempt_timeout: Duration,
) -> (Intercepted<bytes::Bytes>, Arc<ConnectionManager<HttpConnector>>) {
    let connector = HttpConnector::new(HttpConnectorConfig::new(endpoint).expect("valid endpoint"));
    let manager = Arc::new(ConnectionManager::new(connector));
    let interceptor =
        RetryInterceptor::new(&manager, engine).with_attempt_timeout(attempt_timeout);

    let request = UnaryRequest::new(SAY_HELLO, "ping");
    let result = interceptor
        .intercept(request, &CancellationToken::new(), |stub, req, deadline| async move {
            stub.unary(req, deadline).await
        })
        .await;
    (result, manager)
}

#[tokio::test]
async fn test_retries_unavailable_status_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SAY_HELLO))
        .respond_with(ResponseTemplate::new(200).insert_header("grpc-status", "14"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SAY_HELLO))
        .and(body_string("ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("grpc-status", "0")
                .insert_header("x-served-by", "replica-2")
                .set_body_string("pong"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (result, manager) = call(&server.uri(), engine(3), Duration::from_secs(5)).await;

    assert_eq!(result.report.attempts, 3);
    assert_eq!(result.headers["x-served-by"], "replica-2");
    assert_eq!(result.into_outcome().unwrap(), "pong");
    // Protocol-level retries keep the connection.
    assert_eq!(manager.connection_generation(), Some(1));
    server.verify().await;
}

#[tokio::test]
async fn test_fatal_status_is_returned_after_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SAY_HELLO))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("grpc-status", "3")
                .insert_header("grpc-message", "name must not be empty"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (result, _) = call(&server.uri(), engine(3), Duration::from_secs(5)).await;

    assert_eq!(
        result.into_outcome(),
        Err(Failure::Response(
            ResponseStatus::new(http::StatusCode::OK, Some(Code::InvalidArgument))
                .with_message("name must not be empty")
        ))
    );
    server.verify().await;
}

#[tokio::test]
async fn test_server_errors_are_retried_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let (result, _) = call(&server.uri(), engine(3), Duration::from_secs(5)).await;

    assert!(result.report.exhausted);
    assert_eq!(
        result.into_outcome(),
        Err(Failure::response(http::StatusCode::SERVICE_UNAVAILABLE, None))
    );
    server.verify().await;
}

#[tokio::test]
async fn test_slow_server_exceeds_attempt_deadline() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let (result, _) = call(&server.uri(), engine(1), Duration::from_millis(50)).await;

    assert_eq!(result.report.attempts, 2);
    assert!(matches!(
        result.into_outcome(),
        Err(Failure::Protocol(status)) if status.code == Code::DeadlineExceeded
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_transport_failure() {
    let (result, _) = call("http://127.0.0.1:1", engine(0), Duration::from_secs(5)).await;

    assert!(matches!(result.into_outcome(), Err(Failure::Transport(_))));
}

/// Server that reads each request in full and hangs up without answering.
async fn hang_up_server() -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                // Drain the whole request so closing sends FIN rather than RST.
                while !request.ends_with(b"ping") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    (endpoint, accepted)
}

#[tokio::test]
async fn test_closed_without_response_is_retried_as_unknown() {
    let (endpoint, accepted) = hang_up_server().await;

    let (result, manager) = call(&endpoint, engine(2), Duration::from_secs(5)).await;

    assert_eq!(result.report.attempts, 3);
    assert!(result.report.exhausted);
    assert!(matches!(
        result.into_outcome(),
        Err(Failure::Protocol(status)) if status.code == Code::Unknown
    ));
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    // Unknown rebuilds the stub, not the connection.
    assert_eq!(manager.connection_generation(), Some(1));
}
