use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::processor::StreamEventProcessor;
use super::sse::sse_line_stream;
use crate::error::ProxyError;
use crate::session::SessionOutcome;

/// Drive an upstream SSE body through `processor`, yielding the bytes to
/// send downstream.
///
/// Buffered calls are flushed when the body ends even if `[DONE]` never
/// arrived. An upstream error yields one `BackendDisconnected` item and ends
/// the stream without flushing. The session is marked completed only once
/// the consumer has taken the last frame; dropping the stream earlier drops
/// the processor with no outcome, which the session reports as a client
/// disconnect.
pub fn relay_event_stream<S, E>(
    byte_stream: S,
    processor: StreamEventProcessor,
) -> impl Stream<Item = Result<Bytes, ProxyError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures_util::stream::unfold(start_relay(byte_stream, processor), |mut relay| async move {
        let item = relay.next_frame().await?;
        Some((item, relay))
    })
}

struct Relay<L> {
    lines: Pin<Box<L>>,
    processor: StreamEventProcessor,
    pending: VecDeque<Bytes>,
    ended: bool,
}

fn start_relay<S, E>(
    byte_stream: S,
    processor: StreamEventProcessor,
) -> Relay<impl Stream<Item = Result<Bytes, E>> + Send>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    Relay {
        lines: Box::pin(sse_line_stream(byte_stream)),
        processor,
        pending: VecDeque::with_capacity(4),
        ended: false,
    }
}

impl<L, E> Relay<L>
where
    L: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async fn next_frame(&mut self) -> Option<Result<Bytes, ProxyError>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            if self.ended {
                let session = self.processor.session_mut();
                if session.outcome().is_none() {
                    session.finish(SessionOutcome::Completed);
                }
                return None;
            }
            match self.lines.next().await {
                Some(Ok(line)) => self.pending.extend(self.processor.process_line(line)),
                Some(Err(err)) => {
                    tracing::warn!(
                        parent: self.processor.session().span(),
                        error = %err,
                        "backend stream failed"
                    );
                    self.processor
                        .session_mut()
                        .finish(SessionOutcome::BackendDisconnected);
                    self.ended = true;
                    return Some(Err(ProxyError::BackendDisconnected));
                }
                None => {
                    self.ended = true;
                    self.pending.extend(self.processor.finish());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fixes::{FixConfigStore, FixConfiguration};
    use crate::session::RequestSession;

    fn processor() -> StreamEventProcessor {
        StreamEventProcessor::new(
            RequestSession::new("relay001"),
            Arc::new(FixConfigStore::from_configuration(
                FixConfiguration::embedded_default(),
            )),
        )
    }

    fn body(chunks: Vec<Result<&'static str, &'static str>>) -> Vec<Result<Bytes, &'static str>> {
        chunks
            .into_iter()
            .map(|chunk| chunk.map(|s| Bytes::from_static(s.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn flushes_buffers_when_done_is_missing() {
        let upstream = futures_util::stream::iter(body(vec![Ok(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"url\\\": \\\"https://x\\\", \\\"prompt\\\": \\\"p\\\"\"}}]}}]}\n\n",
        )]));
        let out: Vec<Bytes> = relay_event_stream(upstream, processor())
            .map(|item| item.unwrap())
            .collect()
            .await;
        let text: String = out
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect();
        assert!(text.contains("webfetch"));
        assert!(!text.contains("[DONE]"));
    }

    #[tokio::test]
    async fn upstream_error_ends_with_backend_disconnected() {
        let upstream = futures_util::stream::iter(body(vec![
            Ok(": ping\n"),
            Err("connection reset"),
        ]));
        let items: Vec<Result<Bytes, ProxyError>> =
            relay_event_stream(upstream, processor()).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b": ping\n"));
        assert!(matches!(items[1], Err(ProxyError::BackendDisconnected)));
    }

    #[tokio::test]
    async fn completion_is_recorded_after_the_last_frame() {
        let upstream = futures_util::stream::iter(body(vec![Ok(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n",
        )]));
        let mut relay = start_relay(upstream, processor());

        let mut frames = Vec::new();
        while let Some(frame) = relay.next_frame().await {
            assert_eq!(relay.processor.session().outcome(), None);
            frames.push(frame.unwrap());
        }
        assert!(frames.contains(&Bytes::from_static(b"data: [DONE]\n")));
        assert_eq!(
            relay.processor.session().outcome(),
            Some(SessionOutcome::Completed)
        );
    }

    #[tokio::test]
    async fn backend_failure_is_not_overwritten_on_exhaustion() {
        let upstream = futures_util::stream::iter(body(vec![Err("connection reset")]));
        let mut relay = start_relay(upstream, processor());
        assert!(matches!(
            relay.next_frame().await,
            Some(Err(ProxyError::BackendDisconnected))
        ));
        assert!(relay.next_frame().await.is_none());
        assert_eq!(
            relay.processor.session().outcome(),
            Some(SessionOutcome::BackendDisconnected)
        );
    }
}
