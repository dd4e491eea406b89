//! Codex rollout JSONL parser
//!
//! Files live in a `YYYY/MM/DD` tree as `rollout-*-<uuid>.jsonl`. The first
//! line is a `session_meta` record; conversation turns arrive as
//! `response_item` records (`message`, `function_call`,
//! `function_call_output`, `reasoning`) plus optional `event_msg` echoes,
//! all with top-level timestamps.

use crate::discovery::rollout_uuid;
use crate::error::{Error, Result};
use crate::extract::{
    build_tool_call, format_tool_use, is_injected_context, is_synthetic_user_text,
};
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
    timestamp: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    payload: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SessionMetaPayload {
    id: Option<String>,
    cwd: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponseItemPayload {
    #[serde(rename = "type")]
    item_type: Option<String>,
    role: Option<String>,
    content: Option<Vec<ContentBlock>>,
    name: Option<String>,
    arguments: Option<String>,
    call_id: Option<String>,
    output: Option<String>,
    summary: Option<Vec<SummaryBlock>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SummaryBlock {
    text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EventMsgPayload {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TurnContextPayload {
    cwd: Option<String>,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let mut reader = LineReader::open(path)?;

    let mut messages: Vec<Message> = Vec::new();
    let mut meta_id: Option<String> = None;
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
            Some("session_meta") => {
                let Ok(meta) = serde_json::from_value::<SessionMetaPayload>(event.payload) else {
                    continue;
                };
                if meta_id.is_none() {
                    meta_id = meta.id;
                }
                if cwd.is_none() {
                    cwd = meta.cwd;
                }
            }
            Some("turn_context") => {
                let Ok(tc) = serde_json::from_value::<TurnContextPayload>(event.payload) else {
                    continue;
                };
                if cwd.is_none() {
                    cwd = tc.cwd;
                }
            }
            Some("response_item") => {
                let Ok(item) = serde_json::from_value::<ResponseItemPayload>(event.payload) else {
                    continue;
                };
                if let Some(msg) = response_item_to_message(item, timestamp) {
                    messages.push(msg);
                }
            }
            Some("event_msg") => {
                let Ok(em) = serde_json::from_value::<EventMsgPayload>(event.payload) else {
                    continue;
                };
                if let Some(msg) = event_msg_to_message(em, timestamp) {
                    messages.push(msg);
                }
            }
            _ => {}
        }
    }

    if let Some(err) = reader.err() {
        return Err(Error::Parse {
            agent: AgentKind::Codex.as_str().to_string(),
            message: format!("scan failed for {}: {}", path.display(), err),
        });
    }

    if messages.is_empty() && meta_id.is_none() {
        return Ok(Vec::new());
    }

    // The filename uuid wins over the embedded id so source lookups by id
    // always resolve.
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let derived = rollout_uuid(file_name);
    let raw_id = derived
        .clone()
        .or_else(|| meta_id.clone())
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string()
        });
    let parent_id = meta_id
        .filter(|m| *m != raw_id)
        .map(|m| AgentKind::Codex.prefixed_id(&m));

    let project = cwd
        .as_deref()
        .map(|c| project_from_cwd(Path::new(c)))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let session = Session {
        id: AgentKind::Codex.prefixed_id(&raw_id),
        project,
        machine: ctx.machine.to_string(),
        agent: AgentKind::Codex,
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

fn blank_message(role: Role, timestamp: Option<DateTime<Utc>>) -> Message {
    Message {
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
    }
}

fn response_item_to_message(
    item: ResponseItemPayload,
    timestamp: Option<DateTime<Utc>>,
) -> Option<Message> {
    match item.item_type.as_deref() {
        Some("message") => {
            let role = match item.role.as_deref() {
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                _ => return None,
            };
            let text = item
                .content?
                .into_iter()
                .filter_map(|b| match b {
                    ContentBlock::InputText { text }
                    | ContentBlock::OutputText { text }
                    | ContentBlock::Text { text } => Some(text),
                    ContentBlock::Unknown => None,
                })
                .collect::<Vec<_>>()
                .join("\n");
            if text.trim().is_empty() {
                return None;
            }
            if role == Role::User && (is_injected_context(&text) || is_synthetic_user_text(&text)) {
                return None;
            }
            let mut msg = blank_message(role, timestamp);
            msg.content_length = text.len() as i64;
            msg.content = text;
            Some(msg)
        }
        Some("function_call") => {
            let name = item.name?;
            let input: Value = item
                .arguments
                .as_deref()
                .and_then(|a| serde_json::from_str(a).ok())
                .unwrap_or(Value::Null);
            let mut call = build_tool_call(item.call_id, &name, &input);
            // Keep the argument string verbatim when it was not valid JSON.
            if input.is_null() {
                call.input_json = item.arguments.unwrap_or_default();
            }
            let mut msg = blank_message(Role::Assistant, timestamp);
            msg.content = format_tool_use(&name, &input);
            msg.content_length = msg.content.len() as i64;
            msg.has_tool_use = true;
            msg.tool_calls.push(call);
            Some(msg)
        }
        Some("function_call_output") => {
            let call_id = item.call_id?;
            let mut msg = blank_message(Role::User, timestamp);
            msg.tool_results.push(ToolResult {
                tool_use_id: call_id,
                content_length: item.output.map(|o| o.len() as i64).unwrap_or(0),
            });
            Some(msg)
        }
        Some("reasoning") => {
            let body = item
                .summary?
                .into_iter()
                .map(|s| s.text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if body.is_empty() {
                return None;
            }
            let mut msg = blank_message(Role::Assistant, timestamp);
            msg.content = format!("[Thinking]\n{}", body);
            msg.content_length = msg.content.len() as i64;
            msg.has_thinking = true;
            Some(msg)
        }
        _ => None,
    }
}

fn event_msg_to_message(em: EventMsgPayload, timestamp: Option<DateTime<Utc>>) -> Option<Message> {
    let role = match em.msg_type.as_deref() {
        Some("user_message") => Role::User,
        Some("agent_message") => Role::Assistant,
        _ => return None,
    };
    let text = em.message?;
    if text.trim().is_empty() {
        return None;
    }
    if role == Role::User && (is_injected_context(&text) || is_synthetic_user_text(&text)) {
        return None;
    }
    let mut msg = blank_message(role, timestamp);
    msg.content_length = text.len() as i64;
    msg.content = text;
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_NAME: &str =
        "rollout-2025-01-12T10-00-00-1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d.jsonl";
    const UUID: &str = "1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d";

    fn write_rollout(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(FILE_NAME);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn ctx() -> ParseContext<'static> {
        ParseContext {
            project_hint: None,
            machine: "testhost",
            fork_threshold: 3,
        }
    }

    #[test]
    fn test_basic_rollout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rollout(
            dir.path(),
            &[
                &format!(
                    r#"{{"timestamp":"2025-01-12T10:00:00Z","type":"session_meta","payload":{{"id":"{}","cwd":"/tmp/proj"}}}}"#,
                    UUID
                ),
                r#"{"timestamp":"2025-01-12T10:00:01Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"add a test"}]}}"#,
                r#"{"timestamp":"2025-01-12T10:00:05Z","type":"response_item","payload":{"type":"function_call","name":"shell","arguments":"{\"command\":\"cargo test\"}","call_id":"call_1"}}"#,
                r#"{"timestamp":"2025-01-12T10:00:09Z","type":"response_item","payload":{"type":"function_call_output","call_id":"call_1","output":"ok: 12 passed"}}"#,
                r#"{"timestamp":"2025-01-12T10:00:12Z","type":"response_item","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"done"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.session.id, format!("codex:{}", UUID));
        assert_eq!(r.session.message_count, 4);
        assert_eq!(r.session.user_message_count, 1);
        assert_eq!(r.session.first_message, "add a test");
        assert!(r.messages[1].has_tool_use);
        assert_eq!(r.messages[1].tool_calls[0].tool_name, "shell");
        assert_eq!(r.messages[2].tool_results[0].tool_use_id, "call_1");
        assert_eq!(r.messages[2].tool_results[0].content_length, 13);
    }

    #[test]
    fn test_filename_wins_over_embedded_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rollout(
            dir.path(),
            &[
                r#"{"timestamp":"2025-01-12T10:00:00Z","type":"session_meta","payload":{"id":"some-other-id","cwd":"/tmp/proj"}}"#,
                r#"{"timestamp":"2025-01-12T10:00:01Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"hi"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results[0].session.id, format!("codex:{}", UUID));
        assert_eq!(
            results[0].session.parent_id.as_deref(),
            Some("codex:some-other-id")
        );
    }

    #[test]
    fn test_injected_context_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rollout(
            dir.path(),
            &[
                r#"{"timestamp":"2025-01-12T10:00:01Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"<environment_context>cwd=/x</environment_context>"}]}}"#,
                r#"{"timestamp":"2025-01-12T10:00:02Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"real prompt"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results[0].session.message_count, 1);
        assert_eq!(results[0].session.first_message, "real prompt");
    }

    #[test]
    fn test_reasoning_becomes_thinking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rollout(
            dir.path(),
            &[
                r#"{"timestamp":"2025-01-12T10:00:01Z","type":"response_item","payload":{"type":"reasoning","summary":[{"text":"consider the options"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        let msg = &results[0].messages[0];
        assert!(msg.has_thinking);
        assert!(msg.content.starts_with("[Thinking]\n"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rollout(
            dir.path(),
            &[
                "not json at all",
                r#"{"timestamp":"2025-01-12T10:00:01Z","type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"still here"}]}}"#,
            ],
        );

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results[0].session.message_count, 1);
    }
}
