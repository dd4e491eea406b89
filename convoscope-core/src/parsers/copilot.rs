//! Copilot event-stream JSONL parser
//!
//! Sessions live under `session-state/` either as a bare `<uuid>.jsonl` or
//! as `<uuid>/events.jsonl`. Every line is a typed event envelope
//! `{type, timestamp, data}`; unknown event types are skipped silently.

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
#[serde(default)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    timestamp: Option<String>,
    data: Value,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let mut reader = LineReader::open(path)?;

    let mut messages: Vec<Message> = Vec::new();
    let mut cwd: Option<String> = None;
    let mut env_start: Option<DateTime<Utc>> = None;
    let mut env_end: Option<DateTime<Utc>> = None;

    while let Some(line) = reader.next_line() {
        let Ok(event) = serde_json::from_str::<RawEvent>(&line) else {
            continue;
        };
        let timestamp = event.timestamp.as_deref().and_then(parse_timestamp);
        if let Some(ts) = timestamp {
            env_start = Some(env_start.map_or(ts, |s| s.min(ts)));
            env_end = Some(env_end.map_or(ts, |e| e.max(ts)));
        }

        match event.event_type.as_deref() {
            Some("session.start" | "session_start") => {
                if cwd.is_none() {
                    cwd = str_field(&event.data, &["cwd", "working_directory"]).map(str::to_string);
                }
            }
            Some("user.message" | "user_message") => {
                if let Some(text) = text_of(&event.data) {
                    if !is_synthetic_user_text(&text) {
                        messages.push(text_message(Role::User, text, timestamp));
                    }
                }
            }
            Some("assistant.message" | "assistant_message") => {
                if let Some(text) = text_of(&event.data) {
                    messages.push(text_message(Role::Assistant, text, timestamp));
                }
            }
            Some("tool.invocation" | "tool_call" | "tool_use") => {
                let Some(name) = str_field(&event.data, &["name", "tool", "tool_name"]) else {
                    continue;
                };
                let name = name.to_string();
                let input = event
                    .data
                    .get("input")
                    .or_else(|| event.data.get("arguments"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let id = str_field(&event.data, &["tool_use_id", "call_id", "id"])
                    .map(str::to_string);
                let mut msg = text_message(
                    Role::Assistant,
                    format_tool_use(&name, &input),
                    timestamp,
                );
                msg.has_tool_use = true;
                msg.tool_calls.push(build_tool_call(id, &name, &input));
                messages.push(msg);
            }
            Some("tool.result" | "tool_result") => {
                let Some(id) = str_field(&event.data, &["tool_use_id", "call_id", "id"]) else {
                    continue;
                };
                let len = event
                    .data
                    .get("content")
                    .or_else(|| event.data.get("output"))
                    .map(crate::extract::content_text_len)
                    .unwrap_or(0);
                let mut msg = text_message(Role::User, String::new(), timestamp);
                msg.tool_results.push(ToolResult {
                    tool_use_id: id.to_string(),
                    content_length: len,
                });
                messages.push(msg);
            }
            _ => {}
        }
    }

    if let Some(err) = reader.err() {
        return Err(Error::Parse {
            agent: AgentKind::Copilot.as_str().to_string(),
            message: format!("scan failed for {}: {}", path.display(), err),
        });
    }

    if messages.is_empty() {
        return Ok(Vec::new());
    }

    let raw_id = session_id_from_path(path);
    let project = cwd
        .as_deref()
        .map(|c| project_from_cwd(Path::new(c)))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let session = Session {
        id: AgentKind::Copilot.prefixed_id(&raw_id),
        project,
        machine: ctx.machine.to_string(),
        agent: AgentKind::Copilot,
        parent_id: None,
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

/// Bare form: the file stem is the id. Directory form (`<id>/events.jsonl`):
/// the parent directory name is.
fn session_id_from_path(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown");
    if stem == "events" {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or(stem)
            .to_string()
    } else {
        stem.to_string()
    }
}

fn str_field<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| data.get(k).and_then(|v| v.as_str()))
}

fn text_of(data: &Value) -> Option<String> {
    str_field(data, &["content", "text", "message"])
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}

fn text_message(role: Role, content: String, timestamp: Option<DateTime<Utc>>) -> Message {
    Message {
        session_id: String::new(),
        ordinal: 0,
        role,
        content_length: content.len() as i64,
        content,
        timestamp,
        has_thinking: false,
        has_tool_use: false,
        tool_calls: vec![],
        tool_results: vec![],
    }
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

    #[test]
    fn test_bare_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("4dcf0a1e-1111-4f60-9f1f-000000000001.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"session.start","timestamp":"2025-02-01T09:00:00Z","data":{"cwd":"/tmp/site"}}"#, "\n",
                r#"{"type":"user.message","timestamp":"2025-02-01T09:00:01Z","data":{"content":"deploy please"}}"#, "\n",
                r#"{"type":"tool.invocation","timestamp":"2025-02-01T09:00:02Z","data":{"name":"bash","input":{"command":"make deploy"},"id":"t1"}}"#, "\n",
                r#"{"type":"tool.result","timestamp":"2025-02-01T09:00:08Z","data":{"id":"t1","output":"deployed"}}"#, "\n",
                r#"{"type":"assistant.message","timestamp":"2025-02-01T09:00:09Z","data":{"content":"all done"}}"#, "\n",
                r#"{"type":"telemetry.ping","timestamp":"2025-02-01T09:00:10Z","data":{}}"#, "\n",
            ),
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(
            r.session.id,
            "copilot:4dcf0a1e-1111-4f60-9f1f-000000000001"
        );
        assert_eq!(r.session.message_count, 4);
        assert_eq!(r.session.user_message_count, 1);
        assert!(r.messages[1].has_tool_use);
        assert_eq!(r.messages[2].tool_results[0].content_length, 8);
    }

    #[test]
    fn test_directory_form_takes_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("9f8e7d6c-2222-4f60-9f1f-000000000002");
        std::fs::create_dir_all(&session_dir).unwrap();
        let path = session_dir.join("events.jsonl");
        std::fs::write(
            &path,
            r#"{"type":"user.message","timestamp":"2025-02-01T09:00:01Z","data":{"content":"hello"}}"#,
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(
            results[0].session.id,
            "copilot:9f8e7d6c-2222-4f60-9f1f-000000000002"
        );
    }

    #[test]
    fn test_empty_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.jsonl");
        std::fs::write(&path, "").unwrap();
        assert!(parse(&path, &ctx()).unwrap().is_empty());
    }
}
