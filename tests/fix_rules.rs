use std::path::Path;

use serde_json::json;
use toolpatch_rs::fixes::{FixConfigError, FixConfiguration};

fn shipped_rules() -> FixConfiguration {
    FixConfiguration::load(Path::new("tool_fixes.yaml")).expect("shipped tool_fixes.yaml loads")
}

#[test]
fn shipped_document_matches_embedded_rules() {
    let shipped = shipped_rules();
    let embedded = FixConfiguration::embedded_default();
    assert_eq!(shipped.tool_count(), embedded.tool_count());
    assert_eq!(
        shipped.settings.max_buffer_size,
        embedded.settings.max_buffer_size
    );
}

#[test]
fn todowrite_string_todos_become_a_list() {
    let result = shipped_rules().apply_fixes("todowrite", json!({"todos": "[{\"id\":\"1\"}]"}));
    assert_eq!(result.arguments["todos"], json!([{"id": "1"}]));
    assert_eq!(result.applied.as_slice(), ["todos_string_to_array"]);
}

#[test]
fn read_with_content_is_reported_as_write() {
    let result = shipped_rules().apply_fixes("read", json!({"filePath": "a.py", "content": "x"}));
    assert_eq!(result.tool_name, "write");
    assert_eq!(result.arguments, json!({"filePath": "a.py", "content": "x"}));
}

#[test]
fn read_without_file_path_is_not_converted() {
    let result = shipped_rules().apply_fixes("read", json!({"content": "x"}));
    assert_eq!(result.tool_name, "read");
    assert!(result.applied.is_empty());
}

#[test]
fn grep_output_mode_outside_enum_is_reset() {
    let result = shipped_rules().apply_fixes(
        "Grep",
        json!({"pattern": "fn main", "output_mode": "lines"}),
    );
    assert_eq!(result.tool_name, "grep");
    assert_eq!(result.arguments["output_mode"], "files_with_matches");

    let result = shipped_rules().apply_fixes("grep", json!({"pattern": "x", "output_mode": "count"}));
    assert!(result.applied.is_empty());
}

#[test]
fn edit_replace_all_string_becomes_boolean() {
    let result = shipped_rules().apply_fixes(
        "edit",
        json!({"filePath": "a.rs", "oldString": "a", "newString": "b", "replaceAll": "Yes"}),
    );
    assert_eq!(result.arguments["replaceAll"], json!(true));
}

#[test]
fn custom_document_rules_run_in_order() {
    let config = FixConfiguration::from_yaml_str(
        r#"
tools:
  Task:
    fixes:
      - name: drop_debug
        parameter: debug
        condition: exists
        action: remove_parameter
      - name: metadata_to_object
        parameter: metadata
        condition: is_string
        action: parse_json_object
        fallback_value: {}
      - name: delegate
        parameter: prompt
        condition: exists
        action: convert_tool
        to_tool: agent
        requires: [prompt, description]
"#,
    )
    .expect("valid document");

    let result = config.apply_fixes(
        "task",
        json!({"debug": true, "metadata": "{'k': 'v'}", "prompt": "p", "description": "d"}),
    );
    assert_eq!(result.tool_name, "agent");
    assert_eq!(
        result.arguments,
        json!({"metadata": {"k": "v"}, "prompt": "p", "description": "d"})
    );
    assert_eq!(
        result.applied.as_slice(),
        ["drop_debug", "metadata_to_object", "delegate"]
    );
}

#[test]
fn unknown_action_is_rejected_at_load() {
    let err = FixConfiguration::from_yaml_str(
        r"
tools:
  bash:
    fixes:
      - name: typo
        parameter: description
        condition: missing
        action: set_defualt
",
    )
    .unwrap_err();
    assert!(matches!(err, FixConfigError::UnknownAction { ref action, .. } if action == "set_defualt"));
}
