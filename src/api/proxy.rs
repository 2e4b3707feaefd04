use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::request::Parts;
use http::uri::PathAndQuery;
use tracing::Instrument;

use crate::session::SessionOutcome;
use crate::state::AppState;
use crate::stream::{relay_event_stream, StreamEventProcessor};
use crate::transport::strip_response_hop_headers;
use crate::util::preview;

const BODY_PREVIEW_CHARS: usize = 500;

/// Forward any request to the backend and relay the answer.
///
/// Only `text/event-stream` bodies are rewritten; everything else streams
/// through untouched.
pub async fn proxy_handler(state: Arc<AppState>, parts: Parts, body: Bytes) -> Response {
    let Parts {
        method,
        uri,
        headers,
        ..
    } = parts;
    let path_and_query = uri.path_and_query().map_or("/", PathAndQuery::as_str);

    let mut session = state.open_session(state.next_request_seq());
    let span = session.span().clone();
    let started = Instant::now();
    tracing::info!(parent: &span, method = %method, path = path_and_query, "-->");
    if !body.is_empty() && state.fixes.snapshot().settings.detailed_logging {
        tracing::debug!(
            parent: &span,
            bytes = body.len(),
            body = preview(&String::from_utf8_lossy(&body), BODY_PREVIEW_CHARS),
            "request body"
        );
    }

    let upstream = match state
        .transport
        .forward(method, path_and_query, headers, body)
        .instrument(span.clone())
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(
                parent: &span,
                error = ?err,
                elapsed_ms = started.elapsed().as_millis(),
                "backend request failed"
            );
            session.finish(SessionOutcome::BackendDisconnected);
            return err.into_response();
        }
    };

    let status = upstream.status();
    session.record_status(status);
    tracing::info!(
        parent: &span,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis(),
        "<--"
    );

    let mut response_headers = upstream.headers().clone();
    strip_response_hop_headers(&mut response_headers);
    let is_event_stream = response_headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("text/event-stream"));

    let body = if is_event_stream {
        let processor = StreamEventProcessor::new(session, Arc::clone(&state.fixes))
            .with_verbose(state.config.features.verbose);
        Body::from_stream(relay_event_stream(upstream.bytes_stream(), processor))
    } else {
        session.finish(SessionOutcome::Completed);
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
