//! Conversion of `<function=NAME><parameter=KEY>VALUE</parameter></function>`
//! text into a structured tool call.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};

static FUNCTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<function=([^>]+)>").expect("function tag pattern"));
static PARAMETER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<parameter=([^>]+)>\s*([^<]*?)\s*</parameter>").expect("parameter tag pattern")
});

/// A call recovered from XML-tagged free text.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl XmlToolCall {
    /// Serialized argument object, non-ASCII kept as-is.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Scan accumulated content for an XML-tagged call.
///
/// Returns `None` when no function tag is present or when the tag carries no
/// parameters yet; a call with an empty argument set is never produced. Keys
/// and values are trimmed, and a repeated key keeps its last value.
#[must_use]
pub fn detect_xml_tool_call(content: &str) -> Option<XmlToolCall> {
    let name = FUNCTION_TAG.captures(content)?.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }

    let mut arguments = Map::new();
    for captures in PARAMETER_TAG.captures_iter(content) {
        let (Some(key), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        arguments.insert(
            key.as_str().trim().to_owned(),
            Value::String(value.as_str().trim().to_owned()),
        );
    }
    if arguments.is_empty() {
        return None;
    }

    Some(XmlToolCall {
        name: name.to_owned(),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_patterns_compile() {
        assert!(FUNCTION_TAG.is_match("<function=glob>"));
        assert!(PARAMETER_TAG.is_match("<parameter=pattern>*.py</parameter>"));
    }

    #[test]
    fn converts_single_parameter_call() {
        let call = detect_xml_tool_call(
            "<function=glob><parameter=pattern>*.py</parameter></function>",
        )
        .expect("call");
        assert_eq!(call.name, "glob");
        assert_eq!(Value::Object(call.arguments.clone()), json!({"pattern": "*.py"}));
        assert_eq!(call.arguments_json(), r#"{"pattern":"*.py"}"#);
    }

    #[test]
    fn converts_multiline_parameters_in_order() {
        let content = "Let me look.\n<function=grep>\n<parameter=pattern>\nfn main\n</parameter>\n\
                       <parameter=output_mode>content</parameter>\n</function>";
        let call = detect_xml_tool_call(content).expect("call");
        assert_eq!(call.name, "grep");
        let keys: Vec<&str> = call.arguments.keys().map(String::as_str).collect();
        assert_eq!(keys, ["pattern", "output_mode"]);
        assert_eq!(call.arguments["pattern"], "fn main");
    }

    #[test]
    fn function_tag_without_parameters_is_not_a_call() {
        assert_eq!(detect_xml_tool_call("<function=glob>"), None);
        assert_eq!(detect_xml_tool_call("<function=glob><parameter=pattern>*.p"), None);
    }

    #[test]
    fn plain_text_is_not_a_call() {
        assert_eq!(detect_xml_tool_call("no tags here"), None);
        assert_eq!(detect_xml_tool_call("<parameter=a>b</parameter>"), None);
    }

    #[test]
    fn names_and_values_are_trimmed() {
        let call =
            detect_xml_tool_call("<function= read ><parameter= filePath >  a.rs  </parameter>")
                .expect("call");
        assert_eq!(call.name, "read");
        assert_eq!(call.arguments["filePath"], "a.rs");
    }
}
