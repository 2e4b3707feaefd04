use rustc_hash::FxHashSet;

use crate::toolcall::signature;

/// Whether a call was seen before within the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    First,
    Repeat,
}

/// Remembers every `name|arguments` pair sent downstream for one request.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    sent: FxHashSet<String>,
}

impl DuplicateDetector {
    pub fn record(&mut self, name: &str, arguments: &str) -> Sighting {
        if self.sent.insert(signature(name, arguments)) {
            Sighting::First
        } else {
            Sighting::Repeat
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_identical_call_is_a_repeat() {
        let mut detector = DuplicateDetector::default();
        assert_eq!(detector.record("glob", "{}"), Sighting::First);
        assert_eq!(detector.record("glob", "{}"), Sighting::Repeat);
        assert_eq!(detector.record("grep", "{}"), Sighting::First);
        assert_eq!(detector.len(), 2);
    }

    #[test]
    fn argument_text_is_compared_verbatim() {
        let mut detector = DuplicateDetector::default();
        detector.record("glob", r#"{"a":1}"#);
        assert_eq!(detector.record("glob", r#"{"a": 1}"#), Sighting::First);
    }
}
