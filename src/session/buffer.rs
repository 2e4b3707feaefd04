use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use super::dedup::DuplicateDetector;

/// Key of the buffer that collects anonymous argument fragments.
pub const SHARED_BUFFER_KEY: &str = "main_tool_call";

/// Argument text for one logical tool call, accumulated across events.
#[derive(Debug, Clone)]
pub struct ToolCallBuffer {
    key: String,
    tool_name: String,
    content: String,
    created_at: Instant,
    last_updated_at: Instant,
    prepared: bool,
}

impl ToolCallBuffer {
    #[must_use]
    pub fn new(key: impl Into<String>, tool_name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            tool_name: tool_name.into(),
            content: String::new(),
            created_at: now,
            last_updated_at: now,
            prepared: false,
        }
    }

    pub fn append(&mut self, text: &str) {
        self.content.push_str(text);
        self.touch();
    }

    pub fn prepend(&mut self, text: &str) {
        self.content.insert_str(0, text);
        self.touch();
    }

    /// Store final, already fixed arguments so stream end emits them as-is.
    pub fn prepare(&mut self, tool_name: String, arguments: String) {
        self.tool_name = tool_name;
        self.content = arguments;
        self.prepared = true;
    }

    pub fn set_tool_name(&mut self, tool_name: impl Into<String>) {
        self.tool_name = tool_name.into();
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Size in UTF-8 bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Whether the text so far begins with a JSON opener.
    #[must_use]
    pub fn starts_with_opener(&self) -> bool {
        matches!(self.content.trim_start().as_bytes().first(), Some(b'{' | b'['))
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Expiry is measured from the last append, not from creation.
    #[must_use]
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_updated_at) > timeout
    }

    fn touch(&mut self) {
        self.last_updated_at = Instant::now();
    }
}

/// Everything one proxied request remembers between events.
#[derive(Debug, Default)]
pub struct RequestState {
    buffers: FxHashMap<String, ToolCallBuffer>,
    content: String,
    duplicates: DuplicateDetector,
}

impl RequestState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared fragment buffer, created empty on first use.
    pub fn shared_buffer(&mut self) -> &mut ToolCallBuffer {
        self.buffers
            .entry(SHARED_BUFFER_KEY.to_owned())
            .or_insert_with(|| ToolCallBuffer::new(SHARED_BUFFER_KEY, ""))
    }

    #[must_use]
    pub fn buffer(&self, key: &str) -> Option<&ToolCallBuffer> {
        self.buffers.get(key)
    }

    pub fn buffer_mut(&mut self, key: &str) -> Option<&mut ToolCallBuffer> {
        self.buffers.get_mut(key)
    }

    pub fn remove_buffer(&mut self, key: &str) -> Option<ToolCallBuffer> {
        self.buffers.remove(key)
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn buffer_keys(&self) -> Vec<String> {
        self.buffers.keys().cloned().collect()
    }

    /// Remove every buffer, oldest first.
    pub fn drain_buffers(&mut self) -> Vec<ToolCallBuffer> {
        let mut drained: Vec<ToolCallBuffer> = self.buffers.drain().map(|(_, b)| b).collect();
        drained.sort_by_key(ToolCallBuffer::created_at);
        drained
    }

    /// Drop buffers that have not grown within `timeout`; returns their keys.
    pub fn expire_buffers(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.is_expired(now, timeout))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.buffers.remove(key);
        }
        expired
    }

    pub fn push_content(&mut self, text: &str) -> &str {
        self.content.push_str(text);
        &self.content
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn clear_content(&mut self) {
        self.content.clear();
    }

    pub fn duplicates(&mut self) -> &mut DuplicateDetector {
        &mut self.duplicates
    }
}
