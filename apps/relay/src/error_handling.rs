//! Error handling and sanitization
//!
//! Public callers only ever see a short fixed text. The full error, which may
//! name internal hosts or addresses, goes to the log.

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::Full;
use reverse_relay_common::TunnelError;
use tracing::{error, warn};

/// Message shown to the caller for a tunnel failure
///
/// Logs the full error internally. Only pool exhaustion gets a specific text;
/// everything else collapses to the generic status text.
pub fn sanitize_error(e: &TunnelError) -> &'static str {
    match e {
        TunnelError::CapacityExhausted => {
            warn!("Rejected request: {}", e);
            "No tunnel connection available"
        }
        TunnelError::LocalServiceUnavailable(_) => {
            warn!("Agent could not serve request: {}", e);
            "Bad Request"
        }
        _ => {
            error!("Tunnel error: {}", e);
            "Bad Request"
        }
    }
}

/// Plain-text 400 response for a failed tunnel round trip
pub fn error_response(e: &TunnelError) -> Response<Full<Bytes>> {
    bad_request(sanitize_error(e))
}

pub fn bad_request(message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(format!("{}\n", message))));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_sanitize_error_hides_details() {
        let err = TunnelError::RouteNotFound("internal.corp:8080".to_string());
        let sanitized = sanitize_error(&err);

        assert_eq!(sanitized, "Bad Request");
        assert!(!sanitized.contains("internal.corp"));
    }

    #[test]
    fn test_local_failure_is_sanitized() {
        let err = TunnelError::LocalServiceUnavailable("connect to 10.0.1.5:8000 refused".to_string());
        assert_eq!(sanitize_error(&err), "Bad Request");
    }

    #[test]
    fn test_capacity_message() {
        assert_eq!(
            sanitize_error(&TunnelError::CapacityExhausted),
            "No tunnel connection available"
        );
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = error_response(&TunnelError::CapacityExhausted);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"No tunnel connection available\n"));
    }
}
