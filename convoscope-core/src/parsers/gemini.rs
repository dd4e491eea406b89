//! Gemini chat JSON parser
//!
//! One JSON document per session:
//! `{sessionId, startTime, lastUpdated, messages: [...]}` under
//! `tmp/<project-hash>/chats/session-*.json`. Messages carry a role
//! (`user` or `model`) and either a plain `content`/`text` string or a
//! `parts` array.

use crate::error::{Error, Result};
use crate::extract::is_synthetic_user_text;
use crate::linereader::read_document;
use crate::parsers::{assemble, ParseContext};
use crate::timestamp::parse_timestamp;
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ChatDoc {
    session_id: Option<String>,
    start_time: Option<String>,
    last_updated: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChatMessage {
    role: Option<String>,
    #[serde(rename = "type")]
    msg_type: Option<String>,
    content: Option<Value>,
    text: Option<String>,
    parts: Option<Vec<Value>>,
    timestamp: Option<String>,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let bytes = read_document(path, None)?;
    let doc: ChatDoc = serde_json::from_slice(&bytes).map_err(|e| Error::Parse {
        agent: AgentKind::Gemini.as_str().to_string(),
        message: format!("invalid chat document {}: {}", path.display(), e),
    })?;

    let mut messages = Vec::new();
    for raw in &doc.messages {
        let role = match raw
            .role
            .as_deref()
            .or(raw.msg_type.as_deref())
            .unwrap_or("")
        {
            "user" => Role::User,
            "model" | "gemini" | "assistant" => Role::Assistant,
            _ => continue,
        };
        let text = message_text(raw);
        if text.trim().is_empty() {
            continue;
        }
        if role == Role::User && is_synthetic_user_text(&text) {
            continue;
        }
        messages.push(Message {
            session_id: String::new(),
            ordinal: 0,
            role,
            content_length: text.len() as i64,
            content: text,
            timestamp: raw.timestamp.as_deref().and_then(parse_timestamp),
            has_thinking: false,
            has_tool_use: false,
            tool_calls: vec![],
            tool_results: vec![],
        });
    }

    let raw_id = doc.session_id.clone().unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_start_matches("session-").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    let session = Session {
        id: AgentKind::Gemini.prefixed_id(&raw_id),
        project: ctx
            .project_hint
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string()),
        machine: ctx.machine.to_string(),
        agent: AgentKind::Gemini,
        parent_id: None,
        relationship: SessionRelationship::None,
        first_message: String::new(),
        started_at: doc.start_time.as_deref().and_then(parse_timestamp),
        ended_at: doc.last_updated.as_deref().and_then(parse_timestamp),
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    Ok(vec![assemble(session, messages)])
}

fn message_text(raw: &ChatMessage) -> String {
    if let Some(content) = &raw.content {
        match content {
            Value::String(s) => return s.clone(),
            Value::Array(_) => {
                let extracted = crate::extract::extract_content(content);
                if !extracted.text.is_empty() {
                    return extracted.text;
                }
            }
            _ => {}
        }
    }
    if let Some(text) = &raw.text {
        return text.clone();
    }
    if let Some(parts) = &raw.parts {
        return parts
            .iter()
            .filter_map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .or_else(|| p.get("text").and_then(|t| t.as_str()).map(str::to_string))
            })
            .collect::<Vec<_>>()
            .join("\n");
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext<'static> {
        ParseContext {
            project_hint: Some("webapp"),
            machine: "testhost",
            fork_threshold: 3,
        }
    }

    #[test]
    fn test_basic_chat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-20250201.json");
        std::fs::write(
            &path,
            r#"{
                "sessionId": "g-123",
                "startTime": "2025-02-01T08:00:00Z",
                "lastUpdated": "2025-02-01T08:30:00Z",
                "messages": [
                    {"role": "user", "content": "explain this error"},
                    {"role": "model", "content": "the error means"},
                    {"role": "user", "parts": [{"text": "thanks"}]}
                ]
            }"#,
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.session.id, "gemini:g-123");
        assert_eq!(r.session.project, "webapp");
        assert_eq!(r.session.message_count, 3);
        assert_eq!(r.session.user_message_count, 2);
        assert!(r.session.started_at.unwrap() < r.session.ended_at.unwrap());
    }

    #[test]
    fn test_invalid_document_is_file_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(parse(&path, &ctx()).is_err());
    }

    #[test]
    fn test_missing_id_falls_back_to_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-xyz.json");
        std::fs::write(&path, r#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results[0].session.id, "gemini:xyz");
    }
}
