//! Best-effort repair of truncated or malformed tool-call argument JSON.
//!
//! Two strategies exist. [`close_brackets`] appends the closers a truncated
//! payload is missing. [`recover`] runs an ordered list of heuristics that
//! target the malformations seen in practice. Both accept a candidate only
//! when it parses, and neither ever alters text that already parses.

use serde_json::Value;

use crate::json_scan::{next_non_ws, unmatched_openers};

/// Which transform produced a [`RepairedJson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    AlreadyValid,
    CloseBrackets,
    StripDuplicateKey,
    StripTrailingComma,
    AppendBrace,
    WrapInBraces,
}

impl RepairStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyValid => "already_valid",
            Self::CloseBrackets => "close_brackets",
            Self::StripDuplicateKey => "strip_duplicate_key",
            Self::StripTrailingComma => "strip_trailing_comma",
            Self::AppendBrace => "append_brace",
            Self::WrapInBraces => "wrap_in_braces",
        }
    }
}

/// A parseable rendition of some candidate text.
#[derive(Debug, Clone)]
pub struct RepairedJson {
    pub text: String,
    pub value: Value,
    pub strategy: RepairStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("candidate text is empty")]
    Empty,
    #[error("no repair produced parseable JSON")]
    NoRepairPossible,
}

type Heuristic = fn(&str) -> Option<String>;

const HEURISTICS: [(RepairStrategy, Heuristic); 4] = [
    (RepairStrategy::StripDuplicateKey, strip_trailing_duplicate_key),
    (RepairStrategy::StripTrailingComma, strip_trailing_comma),
    (RepairStrategy::AppendBrace, append_brace),
    (RepairStrategy::WrapInBraces, wrap_in_braces),
];

/// Append the `]` and `}` closers a truncated payload is missing.
///
/// Counting is not string-aware. Arrays are closed before objects since they
/// usually nest inside the top-level arguments object.
///
/// # Errors
///
/// Returns [`RepairError::Empty`] for blank input and
/// [`RepairError::NoRepairPossible`] when the closed text still fails to parse.
pub fn close_brackets(text: &str) -> Result<RepairedJson, RepairError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RepairError::Empty);
    }
    if let Some(valid) = parse_as_is(trimmed) {
        return Ok(valid);
    }

    let (braces, brackets) = unmatched_openers(trimmed);
    let mut candidate = String::with_capacity(trimmed.len() + braces + brackets);
    candidate.push_str(trimmed);
    candidate.extend(std::iter::repeat(']').take(brackets));
    candidate.extend(std::iter::repeat('}').take(braces));

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => Ok(RepairedJson {
            text: candidate,
            value,
            strategy: RepairStrategy::CloseBrackets,
        }),
        Err(_) => Err(RepairError::NoRepairPossible),
    }
}

/// Try each recovery heuristic in priority order and keep the first that parses.
///
/// The input is never consumed; on failure the caller still owns the original
/// text and decides whether to drop it.
///
/// # Errors
///
/// Returns [`RepairError::Empty`] for blank input and
/// [`RepairError::NoRepairPossible`] when every heuristic fails.
pub fn recover(text: &str) -> Result<RepairedJson, RepairError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RepairError::Empty);
    }
    if let Some(valid) = parse_as_is(trimmed) {
        return Ok(valid);
    }

    for (strategy, heuristic) in HEURISTICS {
        let Some(candidate) = heuristic(trimmed) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Ok(RepairedJson {
                text: candidate,
                value,
                strategy,
            });
        }
    }
    Err(RepairError::NoRepairPossible)
}

/// Bracket closing first, then heuristic recovery.
///
/// # Errors
///
/// Fails only when both strategies fail.
pub fn repair(text: &str) -> Result<RepairedJson, RepairError> {
    close_brackets(text).or_else(|_| recover(text))
}

fn parse_as_is(text: &str) -> Option<RepairedJson> {
    serde_json::from_str::<Value>(text)
        .ok()
        .map(|value| RepairedJson {
            text: text.to_owned(),
            value,
            strategy: RepairStrategy::AlreadyValid,
        })
}

/// `..."filePath":"a.py","filePath"/bad"}` becomes `..."filePath":"a.py"}`.
///
/// Finds the leftmost comma followed by a quoted key that is not followed by
/// a colon (whitespace before the colon is allowed), where the remainder holds exactly one `}` at the very
/// end, and cuts the text back to a clean closing brace.
fn strip_trailing_duplicate_key(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    if bytes.last() != Some(&b'}') {
        return None;
    }

    for comma in memchr::memchr_iter(b',', bytes) {
        let key_open = next_non_ws(bytes, comma + 1);
        if bytes.get(key_open) != Some(&b'"') {
            continue;
        }
        let Some(rel_close) = memchr::memchr(b'"', &bytes[key_open + 1..]) else {
            continue;
        };
        if rel_close == 0 {
            continue;
        }
        let rest = &bytes[key_open + 1 + rel_close + 1..];
        if rest.get(next_non_ws(rest, 0)) == Some(&b':') {
            continue;
        }
        let body = &rest[..rest.len().saturating_sub(1)];
        if rest.last() == Some(&b'}') && memchr::memchr(b'}', body).is_none() {
            let mut out = String::with_capacity(comma + 1);
            out.push_str(&text[..comma]);
            out.push('}');
            return Some(out);
        }
    }
    None
}

fn strip_trailing_comma(text: &str) -> Option<String> {
    let mut out = text.trim_end_matches(',').to_owned();
    out.push('}');
    Some(out)
}

fn append_brace(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + 1);
    out.push_str(text);
    out.push('}');
    Some(out)
}

fn wrap_in_braces(text: &str) -> Option<String> {
    if text.starts_with('{') {
        return None;
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('{');
    out.push_str(text);
    out.push('}');
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_text_is_returned_unchanged() {
        let text = r#"{"pattern": "**/*.py", "n": [1, 2]}"#;
        let closed = close_brackets(text).expect("valid");
        assert_eq!(closed.text, text);
        assert_eq!(closed.strategy, RepairStrategy::AlreadyValid);

        let recovered = recover(text).expect("valid");
        assert_eq!(recovered.text, text);
        assert_eq!(recovered.strategy, RepairStrategy::AlreadyValid);
    }

    #[test]
    fn close_brackets_closes_arrays_before_objects() {
        let repaired = close_brackets(r#"{"todos": [{"id": "1"}"#).expect("repairable");
        assert_eq!(repaired.text, r#"{"todos": [{"id": "1"}]}"#);
        assert_eq!(repaired.strategy, RepairStrategy::CloseBrackets);
        assert_eq!(repaired.value, json!({"todos": [{"id": "1"}]}));
    }

    #[test]
    fn close_brackets_fails_on_open_string() {
        assert_eq!(
            close_brackets(r#"{"command": "ls -"#).unwrap_err(),
            RepairError::NoRepairPossible
        );
    }

    #[test]
    fn blank_input_never_repairs() {
        assert_eq!(close_brackets("  ").unwrap_err(), RepairError::Empty);
        assert_eq!(recover("").unwrap_err(), RepairError::Empty);
        assert_eq!(repair("\n").unwrap_err(), RepairError::Empty);
    }

    #[test]
    fn recover_strips_malformed_duplicate_key() {
        let repaired =
            recover(r#"{"filePath":"good.py","filePath"/bad"}"#).expect("recoverable");
        assert_eq!(repaired.strategy, RepairStrategy::StripDuplicateKey);
        assert_eq!(repaired.value, json!({"filePath": "good.py"}));
    }

    #[test]
    fn spaced_colon_marks_a_real_key() {
        assert_eq!(
            strip_trailing_duplicate_key(r#"{"pattern": "*.py", "path" : "src"}"#),
            None
        );
        assert_eq!(
            strip_trailing_duplicate_key(r#"{"pattern": "*.py", "path" /bad}"#).as_deref(),
            Some(r#"{"pattern": "*.py"}"#)
        );
    }

    #[test]
    fn recover_strips_trailing_comma() {
        let repaired = recover(r#"{"a": 1,"#).expect("recoverable");
        assert_eq!(repaired.strategy, RepairStrategy::StripTrailingComma);
        assert_eq!(repaired.value, json!({"a": 1}));
    }

    #[test]
    fn recover_wraps_bare_members() {
        let repaired = recover(r#""path": "/tmp""#).expect("recoverable");
        assert_eq!(repaired.strategy, RepairStrategy::WrapInBraces);
        assert_eq!(repaired.value, json!({"path": "/tmp"}));
    }

    #[test]
    fn recover_reports_failure_without_touching_input() {
        let input = String::from(r#"{"a": "unterminated"#);
        assert_eq!(recover(&input).unwrap_err(), RepairError::NoRepairPossible);
        assert_eq!(input, r#"{"a": "unterminated"#);
    }

    #[test]
    fn repair_prefers_bracket_closing_then_heuristics() {
        let closed = repair(r#"{"a": [1, 2"#).expect("repairable");
        assert_eq!(closed.strategy, RepairStrategy::CloseBrackets);

        let recovered = repair(r#"{"a": 1,"#).expect("recoverable");
        assert_eq!(recovered.strategy, RepairStrategy::StripTrailingComma);
        assert_eq!(recovered.value, json!({"a": 1}));
    }

    #[test]
    fn duplicate_key_strip_skips_well_formed_members() {
        assert_eq!(strip_trailing_duplicate_key(r#"{"a":"b","c":"d"}"#), None);
        assert_eq!(
            strip_trailing_duplicate_key(r#"{"a":"b","c" junk}"#).as_deref(),
            Some(r#"{"a":"b"}"#)
        );
    }
}
