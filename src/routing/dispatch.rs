use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::{BodyExt as _, LengthLimitError, Limited};

use crate::api::{health, proxy, reload};
use crate::error::ProxyError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch {
    Health,
    Reload,
    Proxy,
}

/// Dispatch a raw HTTP request to a management endpoint or the proxy path.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let response = match match_route(&parts.method, parts.uri.path()) {
        RouteMatch::Health => health::health_handler(State(state)).into_response(),
        RouteMatch::Reload => reload::reload_handler(State(state)).await,
        RouteMatch::Proxy => {
            let limit = state.config.server.max_request_body_bytes;
            let body_bytes = match read_request_body(body, limit).await {
                Ok(bytes) => bytes,
                Err(err) => return Ok(err.into_response()),
            };
            proxy::proxy_handler(state, parts, body_bytes).await
        }
    };

    Ok(response)
}

/// Collect the request body; only the size cap maps to 413.
async fn read_request_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ProxyError::PayloadTooLarge { limit })
        }
        Err(err) => Err(ProxyError::InvalidRequest(format!(
            "failed to read request body: {err}"
        ))),
    }
}

/// Management paths only answer their own method; anything else is proxied.
fn match_route(method: &Method, path: &str) -> RouteMatch {
    match path {
        "/_health" if method == Method::GET => RouteMatch::Health,
        "/_reload" if method == Method::POST => RouteMatch::Reload,
        _ => RouteMatch::Proxy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn management_routes_need_their_method() {
        assert_eq!(match_route(&Method::GET, "/_health"), RouteMatch::Health);
        assert_eq!(match_route(&Method::POST, "/_reload"), RouteMatch::Reload);
        assert_eq!(match_route(&Method::POST, "/_health"), RouteMatch::Proxy);
        assert_eq!(match_route(&Method::GET, "/_reload"), RouteMatch::Proxy);
        assert_eq!(
            match_route(&Method::POST, "/v1/chat/completions"),
            RouteMatch::Proxy
        );
    }

    #[tokio::test]
    async fn body_over_limit_is_payload_too_large() {
        let err = read_request_body(Body::from(vec![b'x'; 64]), 16)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn aborted_body_is_not_reported_as_too_large() {
        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"model\"")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "client went away",
            )),
        ]);
        let err = read_request_body(Body::from_stream(chunks), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn body_within_limit_is_collected() {
        let bytes = read_request_body(Body::from("{}"), 16).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"{}"));
    }
}
