//! Stateless tool-call helpers and the wire shape of one `delta.tool_calls` entry.

pub mod infer;
pub mod xml;

use serde_json::{json, Value};

pub use self::infer::infer_tool_name;
pub use self::xml::{detect_xml_tool_call, XmlToolCall};

use crate::util::next_call_id;

/// How one raw `delta.tool_calls` entry is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Identifier, name and non-blank arguments.
    Named,
    /// Identifier and name, blank arguments. Announces a call whose body
    /// follows as fragments; never forwarded.
    Header,
    /// Carries `arguments` without being a named call.
    Fragment,
    /// Anything else is forwarded untouched.
    Other,
}

/// Borrowed view over one `delta.tool_calls` entry.
#[derive(Debug, Clone, Copy)]
pub struct ToolCallEntry<'a> {
    pub index: u64,
    pub id: Option<&'a str>,
    pub name: Option<&'a str>,
    pub arguments: Option<&'a str>,
}

impl<'a> ToolCallEntry<'a> {
    #[must_use]
    pub fn from_value(entry: &'a Value) -> Self {
        let function = entry.get("function");
        let text = |value: Option<&'a Value>| value.and_then(Value::as_str);
        Self {
            index: entry.get("index").and_then(Value::as_u64).unwrap_or(0),
            id: text(entry.get("id")).filter(|id| !id.is_empty()),
            name: text(function.and_then(|f| f.get("name"))).filter(|name| !name.is_empty()),
            arguments: text(function.and_then(|f| f.get("arguments"))),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        let named = self.id.is_some() && self.name.is_some();
        let has_body = self.arguments.is_some_and(|text| !text.trim().is_empty());
        match (named, has_body) {
            (true, true) => EntryKind::Named,
            (true, false) => EntryKind::Header,
            (false, _) if self.arguments.is_some() => EntryKind::Fragment,
            (false, _) => EntryKind::Other,
        }
    }
}

/// A tool call produced by the proxy rather than copied from upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl SynthesizedCall {
    /// A call carrying a fresh `call_` identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: next_call_id(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Wire form. The index is always 0; clients reject entries without one.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "index": 0,
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments,
            }
        })
    }

    /// A standalone SSE payload carrying only this call.
    #[must_use]
    pub fn to_completion_event(&self) -> Value {
        json!({
            "choices": [{
                "index": 0,
                "delta": { "tool_calls": [self.to_value()] }
            }]
        })
    }
}

/// `name|arguments`, the identity used for duplicate detection.
#[must_use]
pub fn signature(name: &str, arguments: &str) -> String {
    let mut out = String::with_capacity(name.len() + arguments.len() + 1);
    out.push_str(name);
    out.push('|');
    out.push_str(arguments);
    out
}
