use smallvec::SmallVec;

/// Index of the first non-whitespace byte at or after `from`, or `bytes.len()`.
#[inline]
pub(crate) fn next_non_ws(bytes: &[u8], from: usize) -> usize {
    bytes
        .get(from..)
        .and_then(|tail| tail.iter().position(|b| !b.is_ascii_whitespace()))
        .map_or(bytes.len(), |offset| from + offset)
}

/// Report whether `text` is a syntactically closed JSON object or array.
///
/// Leading whitespace is skipped; the first significant byte must be `{` or
/// `[`. Brackets are tracked on a stack outside of strings, and a closer that
/// does not match the innermost opener marks the text as malformed. Inside a
/// string a backslash consumes the following byte, so `\"` never toggles the
/// string state.
#[must_use]
pub fn is_json_complete(text: &str) -> bool {
    let bytes = text.as_bytes();
    let start = next_non_ws(bytes, 0);
    if !matches!(bytes.get(start), Some(b'{' | b'[')) {
        return false;
    }

    let mut stack: SmallVec<[u8; 16]> = SmallVec::new();
    let mut in_string = false;
    let mut escaped = false;

    for &byte in &bytes[start..] {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(byte),
            b'}' => {
                if stack.pop() != Some(b'{') {
                    return false;
                }
            }
            b']' => {
                if stack.pop() != Some(b'[') {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty() && !in_string
}

/// Count unmatched openers across the whole text without string awareness.
///
/// Returns `(missing_braces, missing_brackets)`; surplus closers count as zero.
#[must_use]
pub(crate) fn unmatched_openers(text: &str) -> (usize, usize) {
    let bytes = text.as_bytes();
    let count = |needle: u8| memchr::memchr_iter(needle, bytes).count();
    let braces = count(b'{').saturating_sub(count(b'}'));
    let brackets = count(b'[').saturating_sub(count(b']'));
    (braces, brackets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_json_is_complete() {
        let values = [
            serde_json::json!({"pattern": "**/*.py"}),
            serde_json::json!({"todos": [{"id": "1", "content": "a { b"}]}),
            serde_json::json!([1, {"a": [true, null]}, "]"]),
            serde_json::json!({}),
        ];
        for value in values {
            let text = serde_json::to_string(&value).expect("serialize");
            assert!(is_json_complete(&text), "{text}");
        }
    }

    #[test]
    fn strict_prefixes_are_incomplete() {
        let text = serde_json::to_string(&serde_json::json!({
            "file_path": "/tmp/a.rs",
            "edits": [{"old_string": "x", "new_string": "y"}]
        }))
        .expect("serialize");
        for end in 1..text.len() {
            let prefix = &text[..end];
            assert!(!is_json_complete(prefix), "prefix {prefix:?} reported complete");
        }
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        assert!(is_json_complete(r#"{"key": "val\"ue"}"#));
        assert!(!is_json_complete(r#"{"key": "val\"}"#));
        assert!(is_json_complete(r#"{"key": "back\\"}"#));
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        assert!(is_json_complete(r#"{"a": "}}]]"}"#));
        assert!(!is_json_complete(r#"{"a": "{{"#));
    }

    #[test]
    fn mismatched_closer_is_incomplete() {
        assert!(!is_json_complete(r#"{"a": [1, 2}"#));
        assert!(!is_json_complete("{]"));
        assert!(!is_json_complete("}"));
    }

    #[test]
    fn empty_or_scalar_text_is_incomplete() {
        assert!(!is_json_complete(""));
        assert!(!is_json_complete("   \n\t"));
        assert!(!is_json_complete("\"just a string\""));
        assert!(!is_json_complete("42"));
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        assert!(is_json_complete("  {\"a\": 1}"));
    }

    #[test]
    fn unmatched_openers_counts_each_kind() {
        assert_eq!(unmatched_openers(r#"{"a": [1, {"b": 2"#), (2, 1));
        assert_eq!(unmatched_openers("{}"), (0, 0));
        assert_eq!(unmatched_openers("}}"), (0, 0));
    }
}
