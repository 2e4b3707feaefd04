//! Per-event rewriting of tool-call deltas.
//!
//! Every `data:` payload of a proxied stream passes through
//! [`StreamEventProcessor`] in arrival order. Complete named calls are fixed
//! and forwarded in place. Argument fragments are collected in the shared
//! buffer and only leave the proxy once they form a complete JSON document.
//! Whatever is still buffered when the stream ends is repaired and emitted as
//! trailing completion events, or dropped.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

use super::sse::{data_payload, openai_sse_frame, DONE_PAYLOAD};
use crate::fixes::{DuplicatePolicy, FixConfigStore, FixConfiguration};
use crate::json_scan::is_json_complete;
use crate::repair::{recover, repair};
use crate::session::{RequestSession, RequestState, Sighting, SHARED_BUFFER_KEY};
use crate::toolcall::{
    detect_xml_tool_call, infer_tool_name, EntryKind, SynthesizedCall, ToolCallEntry,
};
use crate::util::preview;

const LOG_PREVIEW_CHARS: usize = 200;

pub struct StreamEventProcessor {
    session: RequestSession,
    fixes: Arc<FixConfigStore>,
    verbose: bool,
    flushed: bool,
}

impl StreamEventProcessor {
    #[must_use]
    pub fn new(session: RequestSession, fixes: Arc<FixConfigStore>) -> Self {
        Self {
            session,
            fixes,
            verbose: false,
            flushed: false,
        }
    }

    /// Log every rewritten payload at INFO.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn session(&self) -> &RequestSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RequestSession {
        &mut self.session
    }

    /// Rewrite one raw line of the upstream body into the bytes to relay.
    ///
    /// Lines that are not UTF-8, not `data:` lines, or not valid JSON are
    /// returned unchanged. `data: [DONE]` is preceded by the completion
    /// events for whatever was still buffered.
    pub fn process_line(&mut self, line: Bytes) -> Vec<Bytes> {
        let Ok(text) = std::str::from_utf8(&line) else {
            return vec![line];
        };
        let Some(payload) = data_payload(text) else {
            return vec![line];
        };
        if payload == DONE_PAYLOAD {
            let mut out = self.finish();
            out.push(line);
            return out;
        }
        match self.process_payload(payload) {
            Some(rewritten) => vec![Bytes::from(openai_sse_frame(&rewritten))],
            None => vec![line],
        }
    }

    /// Rewrite one `data:` payload; `None` means relay the original text.
    pub fn process_payload(&mut self, payload: &str) -> Option<String> {
        let span = self.session.span().clone();
        let _entered = span.enter();

        let mut event: Value = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    payload = preview(payload, LOG_PREVIEW_CHARS),
                    "invalid JSON in SSE payload, relaying unchanged"
                );
                return None;
            }
        };
        self.process_event(&mut event);

        let rewritten = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize rewritten event");
                return None;
            }
        };
        if self.verbose {
            tracing::info!(payload = %rewritten, "SSE >>");
        } else {
            tracing::trace!(payload = %rewritten, "SSE >>");
        }
        Some(rewritten)
    }

    /// Apply the assembly, repair and conversion pipeline to one event.
    pub fn process_event(&mut self, event: &mut Value) {
        let config = self.fixes.snapshot();
        let Some(choice) = event
            .get_mut("choices")
            .and_then(Value::as_array_mut)
            .and_then(|choices| choices.first_mut())
        else {
            return;
        };
        let finishing = choice.get("finish_reason").and_then(Value::as_str) == Some("tool_calls");

        let mut state = self.session.lock();
        if let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) {
            convert_xml_content(&mut state, delta, &config);
            if let Some(Value::Array(list)) = delta.get_mut("tool_calls") {
                let entries = std::mem::take(list);
                *list = rewrite_tool_calls(&mut state, &config, entries);
                if list.is_empty() {
                    delta.remove("tool_calls");
                }
            }
        }
        if finishing {
            prepare_buffers(&mut state, &config);
        }
    }

    /// Completion events for everything still buffered, framed for the wire.
    ///
    /// Runs once; later calls return nothing.
    pub fn finish(&mut self) -> Vec<Bytes> {
        self.flush_remaining()
            .iter()
            .filter_map(|event| serde_json::to_string(event).ok())
            .map(|json| Bytes::from(openai_sse_frame(&json)))
            .collect()
    }

    /// Repair and emit every outstanding buffer as a standalone event.
    pub fn flush_remaining(&mut self) -> Vec<Value> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;

        let span = self.session.span().clone();
        let _entered = span.enter();
        let config = self.fixes.snapshot();
        let mut state = self.session.lock();
        state.clear_content();

        let mut events = Vec::new();
        for buffer in state.drain_buffers() {
            let call = if buffer.is_prepared() {
                SynthesizedCall::new(buffer.tool_name(), buffer.content())
            } else {
                if buffer.content().trim().is_empty() {
                    continue;
                }
                let repaired = match repair(buffer.content()) {
                    Ok(repaired) => repaired,
                    Err(err) => {
                        tracing::warn!(
                            buffer = buffer.key(),
                            error = %err,
                            content = preview(buffer.content(), LOG_PREVIEW_CHARS),
                            "dropping unrecoverable buffer at stream end"
                        );
                        continue;
                    }
                };
                let name = resolve_name(buffer.tool_name(), &repaired.text);
                if name.is_empty() {
                    tracing::warn!(
                        buffer = buffer.key(),
                        "dropping buffer with unknown tool at stream end"
                    );
                    continue;
                }
                tracing::debug!(
                    tool = %name,
                    strategy = repaired.strategy.as_str(),
                    "repaired buffer at stream end"
                );
                let fixed = config.apply_fixes(&name, repaired.value);
                SynthesizedCall::new(fixed.tool_name.as_str(), fixed.arguments_json())
            };
            if admit(&mut state, &config, &call.name, &call.arguments, &call.id) {
                events.push(call.to_completion_event());
            }
        }
        events
    }
}

struct NamedCall {
    entry: Value,
    index: u64,
    name: String,
    arguments: String,
}

struct Fragment {
    index: u64,
    name: Option<String>,
    arguments: String,
}

enum Slot {
    Keep(Value),
    Fragments,
    Named(usize),
}

/// Feed content into the XML accumulator and swap in a call once one parses.
fn convert_xml_content(
    state: &mut RequestState,
    delta: &mut Map<String, Value>,
    config: &FixConfiguration,
) {
    let Some(text) = delta.get("content").and_then(Value::as_str) else {
        return;
    };
    if text.is_empty() {
        return;
    }
    let detected = detect_xml_tool_call(state.push_content(text));
    match detected {
        Some(call) => {
            tracing::info!(tool = %call.name, "converted XML tool call");
            let synthesized = SynthesizedCall::new(call.name.as_str(), call.arguments_json());
            delta.insert(
                "tool_calls".to_owned(),
                Value::Array(vec![synthesized.to_value()]),
            );
            delta.insert("content".to_owned(), Value::String(String::new()));
            state.clear_content();
        }
        None if state.content().len() > config.settings.max_buffer_size => {
            tracing::warn!(
                size = state.content().len(),
                limit = config.settings.max_buffer_size,
                "content buffer exceeded size limit, clearing"
            );
            state.clear_content();
        }
        None => {}
    }
}

/// Classify, assemble and fix one event's `tool_calls` list.
///
/// Untouched entries keep their position; the call assembled from this
/// event's fragments takes the place of the first fragment; calls completed
/// by merging a named continuation are appended.
fn rewrite_tool_calls(
    state: &mut RequestState,
    config: &FixConfiguration,
    entries: Vec<Value>,
) -> Vec<Value> {
    let mut slots = Vec::with_capacity(entries.len());
    let mut fragments = Vec::new();
    let mut named = Vec::new();

    for entry in entries {
        let view = ToolCallEntry::from_value(&entry);
        let kind = view.kind();
        let index = view.index;
        let name = view.name.map(str::to_owned);
        let arguments = view.arguments.unwrap_or_default().to_owned();
        let id = view.id.map(str::to_owned);
        match kind {
            EntryKind::Named => {
                slots.push(Slot::Named(named.len()));
                named.push(NamedCall {
                    entry,
                    index,
                    name: name.unwrap_or_default(),
                    arguments,
                });
            }
            EntryKind::Header => {
                tracing::debug!(id = ?id, tool = ?name, "suppressed tool-call header");
            }
            EntryKind::Fragment => {
                if fragments.is_empty() {
                    slots.push(Slot::Fragments);
                }
                fragments.push(Fragment {
                    index,
                    name,
                    arguments,
                });
            }
            EntryKind::Other => slots.push(Slot::Keep(entry)),
        }
    }

    let mut fragment_call = if fragments.is_empty() {
        None
    } else {
        absorb_fragments(state, config, fragments)
    };

    let mut named_out: Vec<Option<Value>> = Vec::with_capacity(named.len());
    let mut merged = Vec::new();
    for call in named {
        if is_json_complete(&call.arguments) {
            named_out.push(emit_named(config, call));
        } else {
            named_out.push(None);
            if let Some(completed) = merge_continuation(state, config, &call) {
                merged.push(completed);
            }
        }
    }

    let mut outgoing = Vec::with_capacity(slots.len() + merged.len());
    for slot in slots {
        match slot {
            Slot::Keep(entry) => outgoing.push(entry),
            Slot::Fragments => {
                if let Some(call) = fragment_call.take() {
                    outgoing.push(call.to_value());
                }
            }
            Slot::Named(position) => {
                if let Some(entry) = named_out.get_mut(position).and_then(Option::take) {
                    outgoing.push(entry);
                }
            }
        }
    }
    outgoing.extend(merged.iter().map(SynthesizedCall::to_value));

    outgoing.retain(|entry| {
        let function = entry.get("function");
        let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
        let arguments = function.and_then(|f| f.get("arguments")).and_then(Value::as_str);
        let id = entry.get("id").and_then(Value::as_str).unwrap_or_default();
        match (name, arguments) {
            (Some(name), Some(arguments)) => admit(state, config, name, arguments, id),
            _ => true,
        }
    });
    outgoing
}

/// Append this event's fragments, in index order, to the shared buffer.
fn absorb_fragments(
    state: &mut RequestState,
    config: &FixConfiguration,
    mut fragments: Vec<Fragment>,
) -> Option<SynthesizedCall> {
    fragments.sort_by_key(|fragment| fragment.index);
    let shared = state.shared_buffer();
    for fragment in &fragments {
        if shared.tool_name().is_empty() {
            if let Some(name) = fragment.name.as_deref() {
                shared.set_tool_name(name);
            }
        }
        shared.append(&fragment.arguments);
    }
    if config.settings.detailed_logging {
        tracing::debug!(
            fragments = fragments.len(),
            size = shared.len(),
            "appended fragments to shared buffer"
        );
    }
    if drop_if_oversize(state, config) {
        return None;
    }
    settle_shared_buffer(state, config)
}

/// Merge an incomplete named call into the shared buffer.
fn merge_continuation(
    state: &mut RequestState,
    config: &FixConfiguration,
    call: &NamedCall,
) -> Option<SynthesizedCall> {
    let shared = state.shared_buffer();
    if shared.tool_name().is_empty() {
        shared.set_tool_name(call.name.as_str());
    }
    if shared.starts_with_opener() {
        shared.append(&call.arguments);
    } else {
        shared.prepend(&call.arguments);
    }
    if config.settings.detailed_logging {
        tracing::debug!(
            tool = %call.name,
            size = shared.len(),
            "merged named continuation into shared buffer"
        );
    }
    if drop_if_oversize(state, config) {
        return None;
    }
    settle_shared_buffer(state, config)
}

fn drop_if_oversize(state: &mut RequestState, config: &FixConfiguration) -> bool {
    let limit = config.settings.max_buffer_size;
    let size = state.buffer(SHARED_BUFFER_KEY).map_or(0, |buffer| buffer.len());
    if size <= limit {
        return false;
    }
    tracing::warn!(size, limit, "tool-call buffer exceeded size limit, dropping");
    state.remove_buffer(SHARED_BUFFER_KEY);
    true
}

/// Infer a missing name, then emit the shared buffer if it is complete.
fn settle_shared_buffer(
    state: &mut RequestState,
    config: &FixConfiguration,
) -> Option<SynthesizedCall> {
    let shared = state.buffer_mut(SHARED_BUFFER_KEY)?;
    if shared.content().trim().is_empty() {
        return None;
    }
    if shared.tool_name().is_empty() {
        if let Some(name) = infer_tool_name(shared.content()) {
            tracing::debug!(tool = name, "inferred tool name from arguments");
            shared.set_tool_name(name);
        }
    }
    if !is_json_complete(shared.content()) {
        return None;
    }
    let buffer = state.remove_buffer(SHARED_BUFFER_KEY)?;
    let (name, arguments) = fix_arguments(config, buffer.tool_name(), buffer.content())?;
    Some(SynthesizedCall::new(name, arguments))
}

/// Rewrite a complete named call in place with fixed arguments.
fn emit_named(config: &FixConfiguration, call: NamedCall) -> Option<Value> {
    let (name, arguments) = fix_arguments(config, &call.name, &call.arguments)?;
    let mut entry = call.entry;
    let object = entry.as_object_mut()?;
    object
        .entry("index")
        .or_insert_with(|| Value::from(call.index));
    let function = object
        .entry("function")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()?;
    function.insert("name".to_owned(), Value::String(name));
    function.insert("arguments".to_owned(), Value::String(arguments));
    Some(entry)
}

/// Parse (recovering if needed) and fix complete argument text.
///
/// Returns `None` when the tool is unknown or the text cannot be made valid.
fn fix_arguments(
    config: &FixConfiguration,
    tool_name: &str,
    text: &str,
) -> Option<(String, String)> {
    if tool_name.is_empty() {
        tracing::warn!(
            arguments = preview(text, LOG_PREVIEW_CHARS),
            "dropping tool call with unknown tool"
        );
        return None;
    }
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(parse_err) => match recover(text) {
            Ok(repaired) => {
                tracing::info!(
                    tool = tool_name,
                    strategy = repaired.strategy.as_str(),
                    "repaired malformed tool arguments"
                );
                repaired.value
            }
            Err(err) => {
                tracing::warn!(
                    tool = tool_name,
                    error = %err,
                    parse_error = %parse_err,
                    arguments = preview(text, LOG_PREVIEW_CHARS),
                    "dropping tool call with unrecoverable arguments"
                );
                return None;
            }
        },
    };
    let fixed = config.apply_fixes(tool_name, value);
    let arguments = fixed.arguments_json();
    Some((fixed.tool_name, arguments))
}

/// On `finish_reason == "tool_calls"`: fix each buffer now, keep it for
/// emission at stream end, drop what cannot be fixed.
fn prepare_buffers(state: &mut RequestState, config: &FixConfiguration) {
    for key in state.buffer_keys() {
        let Some(buffer) = state.buffer_mut(&key) else {
            continue;
        };
        if buffer.is_prepared() {
            continue;
        }
        if buffer.content().trim().is_empty() {
            state.remove_buffer(&key);
            continue;
        }
        let name = resolve_name(buffer.tool_name(), buffer.content());
        let fixed = fix_arguments(config, &name, buffer.content());
        match fixed {
            Some((name, arguments)) => {
                tracing::debug!(buffer = %key, tool = %name, "prepared buffer at finish");
                buffer.prepare(name, arguments);
            }
            None => {
                state.remove_buffer(&key);
            }
        }
    }
}

fn resolve_name(known: &str, content: &str) -> String {
    if known.is_empty() {
        infer_tool_name(content).unwrap_or_default().to_owned()
    } else {
        known.to_owned()
    }
}

/// Record an outgoing call; `false` means it must not be sent.
fn admit(
    state: &mut RequestState,
    config: &FixConfiguration,
    name: &str,
    arguments: &str,
    id: &str,
) -> bool {
    match state.duplicates().record(name, arguments) {
        Sighting::First => {
            tracing::info!(
                tool = name,
                id,
                arguments = preview(arguments, LOG_PREVIEW_CHARS),
                "sending tool call"
            );
            true
        }
        Sighting::Repeat => {
            let suppress = config.settings.duplicate_policy == DuplicatePolicy::Suppress;
            tracing::warn!(
                tool = name,
                arguments = preview(arguments, LOG_PREVIEW_CHARS),
                suppressed = suppress,
                "duplicate tool call"
            );
            !suppress
        }
    }
}
