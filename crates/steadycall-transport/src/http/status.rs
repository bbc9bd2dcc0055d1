//! Out-of-band protocol status on HTTP responses.
//!
//! gRPC-style services running over plain HTTP carry their status in the
//! `grpc-status` and `grpc-message` headers instead of failing the request.

use http::{HeaderMap, StatusCode};
use steadycall_core::{Code, Failure, ResponseStatus};

/// Header carrying the protocol status code.
pub const GRPC_STATUS: &str = "grpc-status";

/// Header carrying the protocol status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Read the protocol status embedded in an HTTP response.
///
/// - `grpc-status` present: the parsed code, `None` if it is not an integer
/// - no header on a `200 OK`: `Some(Code::Ok)`
/// - no header otherwise: `None`
///
/// ```rust
/// use http::{HeaderMap, StatusCode};
/// use steadycall_core::Code;
/// use steadycall_transport::http::protocol_status;
///
/// let mut headers = HeaderMap::new();
/// assert_eq!(protocol_status(StatusCode::OK, &headers), Some(Code::Ok));
///
/// headers.insert("grpc-status", "14".parse().unwrap());
/// assert_eq!(protocol_status(StatusCode::OK, &headers), Some(Code::Unavailable));
/// ```
pub fn protocol_status(status: StatusCode, headers: &HeaderMap) -> Option<Code> {
    match headers.get(GRPC_STATUS) {
        Some(value) => value.to_str().ok().and_then(Code::from_header),
        None if status == StatusCode::OK => Some(Code::Ok),
        None => None,
    }
}

/// Like [`protocol_status`], treating a missing response as `Unknown`.
pub fn protocol_status_of<B>(response: Option<&http::Response<B>>) -> Option<Code> {
    match response {
        Some(response) => protocol_status(response.status(), response.headers()),
        None => Some(Code::Unknown),
    }
}

/// The failure an HTTP response represents, `None` if it is a success.
///
/// Only `200 OK` with an `OK` (or absent) protocol status is a success.
pub fn response_failure(status: StatusCode, headers: &HeaderMap) -> Option<Failure> {
    let protocol = protocol_status(status, headers);
    if status == StatusCode::OK && protocol == Some(Code::Ok) {
        return None;
    }

    let mut response = ResponseStatus::new(status, protocol);
    if let Some(message) = headers.get(GRPC_MESSAGE).and_then(|v| v.to_str().ok()) {
        response = response.with_message(message);
    }
    Some(Failure::Response(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[rstest]
    #[case(StatusCode::OK, &[], Some(Code::Ok))]
    #[case(StatusCode::OK, &[("grpc-status", "0")], Some(Code::Ok))]
    #[case(StatusCode::OK, &[("grpc-status", "13")], Some(Code::Internal))]
    #[case(StatusCode::OK, &[("grpc-status", " 4 ")], Some(Code::DeadlineExceeded))]
    #[case(StatusCode::OK, &[("grpc-status", "abc")], None)]
    #[case(StatusCode::BAD_GATEWAY, &[], None)]
    #[case(StatusCode::BAD_GATEWAY, &[("grpc-status", "14")], Some(Code::Unavailable))]
    fn test_protocol_status(
        #[case] status: StatusCode,
        #[case] pairs: &[(&'static str, &'static str)],
        #[case] expected: Option<Code>,
    ) {
        assert_eq!(protocol_status(status, &headers(pairs)), expected);
    }

    #[test]
    fn test_missing_response_is_unknown() {
        assert_eq!(protocol_status_of::<()>(None), Some(Code::Unknown));

        let response = http::Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(())
            .unwrap();
        assert_eq!(protocol_status_of(Some(&response)), None);
    }

    #[test]
    fn test_response_failure() {
        assert_eq!(response_failure(StatusCode::OK, &HeaderMap::new()), None);

        let failure = response_failure(
            StatusCode::OK,
            &headers(&[("grpc-status", "8"), ("grpc-message", "quota")]),
        );
        assert_eq!(
            failure,
            Some(Failure::Response(
                ResponseStatus::new(StatusCode::OK, Some(Code::ResourceExhausted))
                    .with_message("quota")
            ))
        );

        assert_eq!(
            response_failure(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new()),
            Some(Failure::response(StatusCode::SERVICE_UNAVAILABLE, None))
        );
    }
}
