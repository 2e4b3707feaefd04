//! Guess a tool name from the keys present in its argument text.

use memchr::memmem;

/// Infer the most likely tool for argument text whose name never arrived.
///
/// Matching is a plain substring test on quoted key names, so it works on
/// text that is still incomplete. Rules are ordered to split overlapping key
/// sets: `"command"` alongside `"edits"` is not a shell call, `"pattern"`
/// with `"output_mode"` is a grep rather than a glob, and a file path with
/// `"content"` is a write rather than a read. `None` means the call must be
/// treated as unrecoverable.
#[must_use]
pub fn infer_tool_name(content: &str) -> Option<&'static str> {
    if content.is_empty() {
        return None;
    }
    let has = |key: &str| memmem::find(content.as_bytes(), key.as_bytes()).is_some();
    let has_file_path = || has("\"file_path\"") || has("\"filePath\"");

    let name = if has("\"todos\"") {
        "todowrite"
    } else if has("\"command\"") && !has("\"edits\"") {
        "bash"
    } else if has("\"file_path\"") && has("\"edits\"") {
        "multiedit"
    } else if (has("\"filePath\"") && has("\"oldString\"") && has("\"newString\""))
        || (has("\"file_path\"") && has("\"old_string\"") && has("\"new_string\""))
    {
        "edit"
    } else if has("\"pattern\"") && has("\"output_mode\"") {
        "grep"
    } else if has("\"pattern\"") {
        "glob"
    } else if has("\"url\"") && has("\"prompt\"") {
        "webfetch"
    } else if has("\"query\"") {
        "websearch"
    } else if has("\"content\"") && has_file_path() {
        "write"
    } else if has_file_path() {
        "read"
    } else if has("\"description\"") && has("\"prompt\"") && has("\"subagent_type\"") {
        "task"
    } else if has("\"notebook_path\"") && has("\"new_source\"") {
        "notebookedit"
    } else if has("\"path\"") {
        "list"
    } else {
        return None;
    };
    Some(name)
}
