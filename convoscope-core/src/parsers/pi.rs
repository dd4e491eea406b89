//! Pi session JSONL parser
//!
//! The first non-blank line must be a `{type: "session"}` header carrying
//! the id, cwd, start timestamp, and an optional `branchedFrom` pointer;
//! a file without one is rejected as a whole (discovery already filters on
//! the same check). Subsequent lines are `message` entries plus
//! housekeeping records (`model_change`, `compaction`,
//! `thinking_level_change`) that never become messages.
//!
//! Content blocks use camelCase discriminators (`toolCall`, `toolResult`)
//! unlike the reference agent's snake_case.

use crate::error::{Error, Result};
use crate::extract::{build_tool_call, format_tool_use, is_synthetic_user_text};
use crate::linereader::LineReader;
use crate::parsers::{assemble, ParseContext};
use crate::project::project_from_cwd;
use crate::timestamp::parse_timestamp;
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship, ToolResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SessionHeader {
    #[serde(rename = "type")]
    record_type: Option<String>,
    id: Option<String>,
    cwd: Option<String>,
    timestamp: Option<String>,
    branched_from: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawEntry {
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum PiBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default, alias = "arguments")]
        input: Value,
    },
    ToolResult {
        #[serde(default, alias = "toolCallId")]
        tool_use_id: String,
        #[serde(default, alias = "output")]
        content: Value,
    },
    #[serde(other)]
    Unknown,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let mut reader = LineReader::open(path)?;

    let Some(first) = reader.next_line() else {
        return Err(missing_header(path));
    };
    let header: SessionHeader = serde_json::from_str(&first).map_err(|_| missing_header(path))?;
    if header.record_type.as_deref() != Some("session") {
        return Err(missing_header(path));
    }

    let mut messages: Vec<Message> = Vec::new();
    let mut env_start = header.timestamp.as_deref().and_then(parse_timestamp);
    let mut env_end = env_start;

    while let Some(line) = reader.next_line() {
        let Ok(entry) = serde_json::from_str::<RawEntry>(&line) else {
            continue;
        };
        let timestamp = entry.timestamp.as_deref().and_then(parse_timestamp);
        if let Some(ts) = timestamp {
            env_start = Some(env_start.map_or(ts, |s| s.min(ts)));
            env_end = Some(env_end.map_or(ts, |e| e.max(ts)));
        }
        // model_change, compaction, and thinking_level_change entries are
        // synthesized housekeeping, not conversation turns.
        if entry.record_type.as_deref() != Some("message") {
            continue;
        }
        let Some(raw_msg) = entry.message else {
            continue;
        };
        if let Some(msg) = to_message(raw_msg, timestamp) {
            messages.push(msg);
        }
    }

    if let Some(err) = reader.err() {
        return Err(Error::Parse {
            agent: AgentKind::Pi.as_str().to_string(),
            message: format!("scan failed for {}: {}", path.display(), err),
        });
    }

    // The filename is authoritative so source lookup by id stays
    // consistent; the header id is the fallback for unnamed files.
    let raw_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .or(header.id.clone())
        .ok_or_else(|| missing_header(path))?;

    let parent_id = header.branched_from.as_deref().map(|b| {
        let base = Path::new(b)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(b);
        AgentKind::Pi.prefixed_id(base)
    });

    let project = header
        .cwd
        .as_deref()
        .map(|c| project_from_cwd(Path::new(c)))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let session = Session {
        id: AgentKind::Pi.prefixed_id(&raw_id),
        project,
        machine: ctx.machine.to_string(),
        agent: AgentKind::Pi,
        parent_id,
        relationship: SessionRelationship::None,
        first_message: String::new(),
        started_at: env_start,
        ended_at: env_end,
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    Ok(vec![assemble(session, messages)])
}

fn missing_header(path: &Path) -> Error {
    Error::Parse {
        agent: AgentKind::Pi.as_str().to_string(),
        message: format!("missing session header: {}", path.display()),
    }
}

fn to_message(raw: RawMessage, timestamp: Option<DateTime<Utc>>) -> Option<Message> {
    let role = match raw.role.as_deref() {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        _ => return None,
    };

    let mut msg = Message {
        session_id: String::new(),
        ordinal: 0,
        role,
        content: String::new(),
        timestamp,
        has_thinking: false,
        has_tool_use: false,
        content_length: 0,
        tool_calls: vec![],
        tool_results: vec![],
    };

    match raw.content? {
        Value::String(s) => {
            if s.trim().is_empty() || (role == Role::User && is_synthetic_user_text(&s)) {
                return None;
            }
            msg.content = s;
        }
        Value::Array(blocks) => {
            let mut parts = Vec::new();
            for raw_block in blocks {
                let Ok(block) = serde_json::from_value::<PiBlock>(raw_block) else {
                    continue;
                };
                match block {
                    PiBlock::Text { text } => {
                        if !text.is_empty() {
                            parts.push(text);
                        }
                    }
                    PiBlock::Thinking { thinking } => {
                        if !thinking.is_empty() {
                            msg.has_thinking = true;
                            parts.push(format!("[Thinking]\n{}", thinking));
                        }
                    }
                    PiBlock::ToolCall { id, name, input } => {
                        msg.has_tool_use = true;
                        parts.push(format_tool_use(&name, &input));
                        msg.tool_calls.push(build_tool_call(id, &name, &input));
                    }
                    PiBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => {
                        msg.tool_results.push(ToolResult {
                            tool_use_id,
                            content_length: crate::extract::content_text_len(&content),
                        });
                    }
                    PiBlock::Unknown => {}
                }
            }
            msg.content = parts.join("\n");
            if role == Role::User
                && !msg.content.is_empty()
                && is_synthetic_user_text(&msg.content)
            {
                return None;
            }
        }
        _ => return None,
    }

    if msg.content.is_empty() && msg.tool_calls.is_empty() && msg.tool_results.is_empty() {
        return None;
    }
    msg.content_length = msg.content.len() as i64;
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext<'static> {
        ParseContext {
            project_hint: None,
            machine: "testhost",
            fork_threshold: 3,
        }
    }

    fn write_pi(dir: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_basic_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pi(
            dir.path(),
            "pi-sess-1.jsonl",
            &[
                r#"{"type":"session","id":"pi-sess-1","cwd":"/tmp/app","timestamp":"2025-03-01T10:00:00Z"}"#,
                r#"{"type":"message","timestamp":"2025-03-01T10:00:01Z","message":{"role":"user","content":"hello pi"}}"#,
                r#"{"type":"model_change","timestamp":"2025-03-01T10:00:02Z"}"#,
                r#"{"type":"message","timestamp":"2025-03-01T10:00:03Z","message":{"role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"hi"}]}}"#,
                r#"{"type":"compaction","timestamp":"2025-03-01T10:00:04Z"}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.session.id, "pi:pi-sess-1");
        assert_eq!(r.session.message_count, 2);
        assert_eq!(r.session.user_message_count, 1);
        assert!(r.messages[1].has_thinking);
        // Housekeeping entries widen the envelope but are not messages
        assert_eq!(
            r.session.ended_at.unwrap(),
            parse_timestamp("2025-03-01T10:00:04Z").unwrap()
        );
    }

    #[test]
    fn test_missing_header_is_file_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pi(
            dir.path(),
            "x.jsonl",
            &[r#"{"type":"message","message":{"role":"user","content":"hi"}}"#],
        );
        assert!(parse(&path, &ctx()).is_err());
    }

    #[test]
    fn test_branched_from_becomes_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pi(
            dir.path(),
            "child.jsonl",
            &[
                r#"{"type":"session","id":"child","cwd":"/tmp/app","timestamp":"2025-03-01T10:00:00Z","branchedFrom":"/some/dir/parent-sess.jsonl"}"#,
                r#"{"type":"message","message":{"role":"user","content":"go on"}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results[0].session.parent_id.as_deref(), Some("pi:parent-sess"));
    }

    #[test]
    fn test_camel_case_tool_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pi(
            dir.path(),
            "tools.jsonl",
            &[
                r#"{"type":"session","id":"tools","cwd":"/tmp/app","timestamp":"2025-03-01T10:00:00Z"}"#,
                r#"{"type":"message","message":{"role":"assistant","content":[{"type":"toolCall","id":"c1","name":"bash","input":{"command":"ls"}}]}}"#,
                r#"{"type":"message","message":{"role":"user","content":[{"type":"toolResult","toolCallId":"c1","output":"files"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        let r = &results[0];
        assert_eq!(r.session.message_count, 2);
        // Tool-result-only user message is not a user turn
        assert_eq!(r.session.user_message_count, 0);
        assert_eq!(r.messages[0].tool_calls.len(), 1);
        assert_eq!(r.messages[1].tool_results[0].tool_use_id, "c1");
        assert_eq!(r.messages[1].tool_results[0].content_length, 5);
    }
}
