use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error type for the proxy request path.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Backend server disconnected")]
    BackendUnavailable(#[source] reqwest::Error),
    #[error("Backend server disconnected")]
    BackendDisconnected,
    #[error("Client disconnected")]
    ClientDisconnected,
}

/// Non-standard status used in logs when the client goes away mid-request.
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => http::StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BackendUnavailable(_) | ProxyError::BackendDisconnected => {
                http::StatusCode::BAD_GATEWAY
            }
            ProxyError::ClientDisconnected => http::StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(http::StatusCode::BAD_REQUEST),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) | ProxyError::PayloadTooLarge { .. } => {
                "invalid_request_error"
            }
            ProxyError::BackendUnavailable(_) | ProxyError::BackendDisconnected => "upstream_error",
            ProxyError::ClientDisconnected => "client_error",
        }
    }

    /// `{"error": {"message", "type"}}`, the body shape clients of the
    /// chat completions API already understand.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_failure_kind() {
        assert_eq!(
            ProxyError::InvalidRequest("x".into()).status(),
            http::StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1 }.status(),
            http::StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::BackendDisconnected.status(),
            http::StatusCode::BAD_GATEWAY
        );
        assert_eq!(ProxyError::ClientDisconnected.status().as_u16(), 499);
    }

    #[test]
    fn backend_failure_message_is_fixed() {
        let body = ProxyError::BackendDisconnected.body();
        assert_eq!(body["error"]["message"], "Backend server disconnected");
        assert_eq!(body["error"]["type"], "upstream_error");
    }
}
