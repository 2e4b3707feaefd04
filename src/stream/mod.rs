pub mod processor;
pub mod relay;
pub mod sse;

pub use processor::StreamEventProcessor;
pub use relay::relay_event_stream;
pub use sse::{data_payload, openai_sse_frame, sse_line_stream, DONE_PAYLOAD};
