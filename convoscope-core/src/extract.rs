//! Content extraction
//!
//! Agents store message content either as a bare string or as an array of
//! typed blocks (`text`, `thinking`, `tool_use`, `tool_result`). This
//! module flattens both shapes into the common message fields: joined
//! display text, thinking/tool flags, structured tool calls, and tool
//! result lengths. Unknown block variants are skipped silently.

use crate::taxonomy::{categorize_tool, ToolCategory};
use crate::types::{ToolCall, ToolResult};
use serde::Deserialize;
use serde_json::Value;

/// Everything extracted from one content payload.
#[derive(Debug, Default, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub has_thinking: bool,
    pub has_tool_use: bool,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
}

impl ExtractedContent {
    /// True when the payload produced nothing at all; such blocks are
    /// dropped rather than stored as empty messages.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty() && self.tool_results.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Unknown,
}

/// Extract text, flags, and tool structures from a content payload.
pub fn extract_content(content: &Value) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    match content {
        Value::String(s) => {
            out.text = s.clone();
        }
        Value::Array(blocks) => {
            let mut parts: Vec<String> = Vec::new();
            for raw in blocks {
                let Ok(block) = serde_json::from_value::<ContentBlock>(raw.clone()) else {
                    continue;
                };
                match block {
                    ContentBlock::Text { text } => {
                        if !text.is_empty() {
                            parts.push(text);
                        }
                    }
                    ContentBlock::Thinking { thinking, text } => {
                        let body = if thinking.is_empty() { text } else { thinking };
                        if !body.is_empty() {
                            out.has_thinking = true;
                            parts.push(format!("[Thinking]\n{}", body));
                        }
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        out.has_tool_use = true;
                        parts.push(format_tool_use(&name, &input));
                        out.tool_calls.push(build_tool_call(id, &name, &input));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        out.tool_results.push(ToolResult {
                            tool_use_id,
                            content_length: content_text_len(&content),
                        });
                    }
                    ContentBlock::Unknown => {}
                }
            }
            out.text = parts.join("\n");
        }
        _ => {}
    }
    out
}

/// Build a [`ToolCall`] from a tool_use block, preserving the raw input.
pub fn build_tool_call(id: Option<String>, name: &str, input: &Value) -> ToolCall {
    let skill_name = if name == "Skill" {
        input
            .get("skill")
            .or_else(|| input.get("skill_name"))
            .or_else(|| input.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    } else {
        None
    };
    ToolCall {
        tool_use_id: id,
        tool_name: name.to_string(),
        category: categorize_tool(name),
        input_json: input.to_string(),
        skill_name,
        subagent_session_id: None,
    }
}

fn str_field<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| input.get(k).and_then(|v| v.as_str()))
}

/// Render a compact one-line (two for Bash) header for a tool invocation.
pub fn format_tool_use(name: &str, input: &Value) -> String {
    match categorize_tool(name) {
        ToolCategory::Read | ToolCategory::Edit | ToolCategory::Write => {
            match str_field(input, &["file_path", "filePath", "path", "notebook_path"]) {
                Some(path) => format!("[{}: {}]", name, path),
                None => format!("[{}]", name),
            }
        }
        ToolCategory::Bash => {
            let desc = str_field(input, &["description"]);
            let command = str_field(input, &["command", "cmd"]);
            match (desc, command) {
                (Some(d), Some(c)) => format!("[{}: {}]\n$ {}", name, d, c),
                (None, Some(c)) => format!("[{}]\n$ {}", name, c),
                (Some(d), None) => format!("[{}: {}]", name, d),
                (None, None) => format!("[{}]", name),
            }
        }
        ToolCategory::Grep | ToolCategory::Glob => {
            match str_field(input, &["pattern", "query", "glob"]) {
                Some(p) => format!("[{}: {}]", name, p),
                None => format!("[{}]", name),
            }
        }
        ToolCategory::Task => match str_field(input, &["description", "prompt"]) {
            Some(d) => format!("[{}: {}]", name, first_line(d)),
            None => format!("[{}]", name),
        },
        ToolCategory::Tool | ToolCategory::Other => {
            match str_field(
                input,
                &["command", "file_path", "path", "pattern", "query", "description", "skill"],
            ) {
                Some(arg) => format!("[{}: {}]", name, first_line(arg)),
                None => format!("[{}]", name),
            }
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

/// Length in bytes of the text carried by a tool_result content payload.
pub fn content_text_len(content: &Value) -> i64 {
    match content {
        Value::String(s) => s.len() as i64,
        Value::Array(blocks) => blocks
            .iter()
            .map(|b| {
                b.get("text")
                    .and_then(|t| t.as_str())
                    .map(|t| t.len() as i64)
                    .unwrap_or(0)
            })
            .sum(),
        Value::Null => 0,
        other => other.to_string().len() as i64,
    }
}

// ============================================
// User-turn filtering
// ============================================

/// Prefixes of user-role messages that agents synthesize themselves.
/// These never reach the message list.
const SYNTHETIC_USER_PREFIXES: &[&str] = &[
    "This session is being continued",
    "[Request interrupted",
    "<task-notification>",
    "<command-message>",
    "<command-name>",
    "<local-command-",
    "Stop hook feedback:",
];

/// System-injected context wrappers seen in codex-style transcripts.
const INJECTED_CONTEXT_PREFIXES: &[&str] = &[
    "<environment_context>",
    "<user_instructions>",
    "<user_shell_command>",
    "<INSTRUCTIONS>",
    "<system",
    "# AGENTS.md instructions for",
];

/// True for user-role text the agent generated itself rather than the user
/// typing it.
pub fn is_synthetic_user_text(text: &str) -> bool {
    let trimmed = text.trim_start();
    SYNTHETIC_USER_PREFIXES
        .iter()
        .any(|p| trimmed.starts_with(p))
}

/// True for user-role text that is injected environment/system context.
pub fn is_injected_context(text: &str) -> bool {
    let trimmed = text.trim_start();
    INJECTED_CONTEXT_PREFIXES
        .iter()
        .any(|p| trimmed.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_content() {
        let out = extract_content(&json!("hello there"));
        assert_eq!(out.text, "hello there");
        assert!(!out.has_thinking);
        assert!(!out.has_tool_use);
    }

    #[test]
    fn test_blocks_with_thinking_and_text() {
        let out = extract_content(&json!([
            {"type": "thinking", "thinking": "let me see"},
            {"type": "text", "text": "the answer"},
        ]));
        assert!(out.has_thinking);
        assert_eq!(out.text, "[Thinking]\nlet me see\nthe answer");
    }

    #[test]
    fn test_tool_use_block() {
        let out = extract_content(&json!([
            {"type": "tool_use", "id": "tu_1", "name": "Read",
             "input": {"file_path": "/tmp/a.rs"}},
        ]));
        assert!(out.has_tool_use);
        assert_eq!(out.text, "[Read: /tmp/a.rs]");
        assert_eq!(out.tool_calls.len(), 1);
        let call = &out.tool_calls[0];
        assert_eq!(call.tool_use_id.as_deref(), Some("tu_1"));
        assert_eq!(call.category, ToolCategory::Read);
        assert!(call.input_json.contains("/tmp/a.rs"));
    }

    #[test]
    fn test_bash_formatting() {
        let s = format_tool_use(
            "Bash",
            &json!({"description": "list files", "command": "ls -la"}),
        );
        assert_eq!(s, "[Bash: list files]\n$ ls -la");
    }

    #[test]
    fn test_tool_result_contributes_length_only() {
        let out = extract_content(&json!([
            {"type": "tool_result", "tool_use_id": "tu_1", "content": "12345"},
        ]));
        assert!(out.text.is_empty());
        assert_eq!(out.tool_results.len(), 1);
        assert_eq!(out.tool_results[0].content_length, 5);
    }

    #[test]
    fn test_tool_result_block_array_length() {
        let len = content_text_len(&json!([
            {"type": "text", "text": "abc"},
            {"type": "text", "text": "de"},
        ]));
        assert_eq!(len, 5);
    }

    #[test]
    fn test_unknown_blocks_skipped() {
        let out = extract_content(&json!([
            {"type": "image", "source": {"media_type": "image/png"}},
            {"type": "text", "text": "after"},
        ]));
        assert_eq!(out.text, "after");
        assert!(!out.is_empty());
    }

    #[test]
    fn test_empty_payload_is_empty() {
        assert!(extract_content(&json!([])).is_empty());
        assert!(extract_content(&json!(null)).is_empty());
    }

    #[test]
    fn test_skill_name() {
        let call = build_tool_call(None, "Skill", &json!({"skill": "commit"}));
        assert_eq!(call.skill_name.as_deref(), Some("commit"));
        let other = build_tool_call(None, "Read", &json!({"file_path": "x"}));
        assert!(other.skill_name.is_none());
    }

    #[test]
    fn test_synthetic_user_text() {
        assert!(is_synthetic_user_text(
            "This session is being continued from a previous conversation"
        ));
        assert!(is_synthetic_user_text("<command-name>/clear</command-name>"));
        assert!(is_synthetic_user_text("[Request interrupted by user]"));
        assert!(!is_synthetic_user_text("please fix the bug"));
    }

    #[test]
    fn test_injected_context() {
        assert!(is_injected_context("<environment_context>cwd=/x</environment_context>"));
        assert!(!is_injected_context("normal question"));
    }
}
