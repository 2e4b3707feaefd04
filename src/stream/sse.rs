//! Line framing for proxied `text/event-stream` bodies.

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use memchr::memchr;

/// Sentinel payload that ends an OpenAI-style stream.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Split a byte stream into lines, each including its trailing `\n`.
///
/// A final line without a terminator is yielded when the stream ends. An
/// upstream error is passed through and ends the stream.
pub fn sse_line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(4096), 0usize, false),
        |(mut stream, mut buffer, mut scan_from, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(rel) = memchr(b'\n', &buffer[scan_from..]) {
                    let line = buffer.split_to(scan_from + rel + 1).freeze();
                    return Some((Ok(line), (stream, buffer, 0, false)));
                }
                scan_from = buffer.len();

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        let single_line =
                            memchr(b'\n', &bytes).is_some_and(|pos| pos + 1 == bytes.len());
                        if buffer.is_empty() && single_line {
                            return Some((Ok(bytes), (stream, buffer, 0, false)));
                        }
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(err)) => return Some((Err(err), (stream, buffer, 0, true))),
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let line = buffer.split().freeze();
                        return Some((Ok(line), (stream, buffer, 0, true)));
                    }
                }
            }
        },
    )
}

/// The trimmed payload of a `data:` line, or `None` for any other line.
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Format an OpenAI-style SSE frame (no event type, just data).
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}
