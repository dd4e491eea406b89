//! Cursor transcript parser
//!
//! Transcripts live under `<project>/agent-transcripts/<id>.{txt,jsonl}`.
//! Most are plain text with `user:` / `assistant:` turn markers and
//! `[Thinking]` / `[Tool call] NAME` / `[Tool result]` delimiters, with
//! tagged user content inside `<user_query>...</user_query>`. An alternate
//! variant is JSONL of Anthropic-style message objects; the two are told
//! apart by sniffing the first non-blank line for valid JSON.
//!
//! Full-text reads are capped at [`DOC_MAX_LEN`]; identical transcripts
//! under different paths are deduplicated by content hash at the store
//! layer, which is why [`content_hash`] lives here.

use crate::error::{Error, Result};
use crate::extract::{extract_content, is_synthetic_user_text};
use crate::linereader::{read_document, sniff_first_line, LineReader, DOC_MAX_LEN};
use crate::parsers::{assemble, ParseContext};
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship, ToolCall, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 hex digest of a transcript's bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct JsonlMessage {
    role: Option<String>,
    content: Value,
    message: Option<InnerMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct InnerMessage {
    role: Option<String>,
    content: Value,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let Some(first) = sniff_first_line(path)? else {
        return Ok(Vec::new());
    };
    let is_jsonl = serde_json::from_str::<Value>(&first)
        .map(|v| v.is_object())
        .unwrap_or(false);

    let messages = if is_jsonl {
        parse_jsonl(path)?
    } else {
        parse_text(path)?
    };

    if messages.is_empty() {
        return Ok(Vec::new());
    }

    let raw_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let session = Session {
        id: AgentKind::Cursor.prefixed_id(&raw_id),
        project: ctx
            .project_hint
            .map(str::to_string)
            .unwrap_or_else(|| "unknown".to_string()),
        machine: ctx.machine.to_string(),
        agent: AgentKind::Cursor,
        parent_id: None,
        relationship: SessionRelationship::None,
        first_message: String::new(),
        started_at: None,
        ended_at: None,
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    Ok(vec![assemble(session, messages)])
}

fn parse_jsonl(path: &Path) -> Result<Vec<Message>> {
    let mut reader = LineReader::open(path)?;
    let mut messages = Vec::new();
    while let Some(line) = reader.next_line() {
        let Ok(obj) = serde_json::from_str::<JsonlMessage>(&line) else {
            continue;
        };
        let (role_str, content) = match &obj.message {
            Some(inner) if inner.role.is_some() => (inner.role.as_deref(), &inner.content),
            _ => (obj.role.as_deref(), &obj.content),
        };
        let role = match role_str {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let extracted = extract_content(content);
        if extracted.is_empty() {
            continue;
        }
        if role == Role::User
            && !extracted.text.is_empty()
            && is_synthetic_user_text(&extracted.text)
        {
            continue;
        }
        messages.push(Message {
            session_id: String::new(),
            ordinal: 0,
            role,
            content_length: extracted.text.len() as i64,
            content: extracted.text,
            timestamp: None,
            has_thinking: extracted.has_thinking,
            has_tool_use: extracted.has_tool_use,
            tool_calls: extracted.tool_calls,
            tool_results: extracted.tool_results,
        });
    }
    if let Some(err) = reader.err() {
        return Err(Error::Parse {
            agent: AgentKind::Cursor.as_str().to_string(),
            message: format!("scan failed for {}: {}", path.display(), err),
        });
    }
    Ok(messages)
}

// ============================================
// Plain-text grammar
// ============================================

#[derive(Default)]
struct Turn {
    role: Option<Role>,
    lines: Vec<String>,
    has_thinking: bool,
    has_tool_use: bool,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResult>,
    in_tool_result: bool,
}

impl Turn {
    fn flush(&mut self, out: &mut Vec<Message>) {
        let Some(role) = self.role else {
            *self = Turn::default();
            return;
        };
        let mut content = self.lines.join("\n").trim().to_string();
        if role == Role::User {
            content = unwrap_user_query(&content);
        }
        let keep = !content.is_empty() || !self.tool_calls.is_empty() || !self.tool_results.is_empty();
        let synthetic = role == Role::User && !content.is_empty() && is_synthetic_user_text(&content);
        if keep && !synthetic {
            out.push(Message {
                session_id: String::new(),
                ordinal: 0,
                role,
                content_length: content.len() as i64,
                content,
                timestamp: None,
                has_thinking: self.has_thinking,
                has_tool_use: self.has_tool_use,
                tool_calls: std::mem::take(&mut self.tool_calls),
                tool_results: std::mem::take(&mut self.tool_results),
            });
        }
        *self = Turn::default();
    }
}

fn parse_text(path: &Path) -> Result<Vec<Message>> {
    let bytes = read_document(path, Some(DOC_MAX_LEN))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut messages = Vec::new();
    let mut turn = Turn::default();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("user:") {
            turn.flush(&mut messages);
            turn.role = Some(Role::User);
            push_content(&mut turn, rest.trim_start());
        } else if let Some(rest) = line.strip_prefix("assistant:") {
            turn.flush(&mut messages);
            turn.role = Some(Role::Assistant);
            push_content(&mut turn, rest.trim_start());
        } else if line.trim() == "[Thinking]" {
            turn.in_tool_result = false;
            turn.has_thinking = true;
            turn.lines.push("[Thinking]".to_string());
        } else if let Some(rest) = line.trim().strip_prefix("[Tool call]") {
            turn.in_tool_result = false;
            let name = rest.trim();
            if !name.is_empty() {
                turn.has_tool_use = true;
                turn.lines.push(format!("[{}]", name));
                turn.tool_calls.push(ToolCall {
                    tool_use_id: None,
                    tool_name: name.to_string(),
                    category: crate::taxonomy::categorize_tool(name),
                    input_json: "{}".to_string(),
                    skill_name: None,
                    subagent_session_id: None,
                });
            }
        } else if line.trim().starts_with("[Tool result]") {
            turn.in_tool_result = true;
            turn.tool_results.push(ToolResult {
                tool_use_id: String::new(),
                content_length: 0,
            });
        } else if turn.in_tool_result {
            if let Some(result) = turn.tool_results.last_mut() {
                result.content_length += line.len() as i64 + 1;
            }
        } else {
            push_content(&mut turn, line);
        }
    }
    turn.flush(&mut messages);
    Ok(messages)
}

fn push_content(turn: &mut Turn, line: &str) {
    if !line.is_empty() || !turn.lines.is_empty() {
        turn.lines.push(line.to_string());
    }
}

fn unwrap_user_query(content: &str) -> String {
    let Some(start) = content.find("<user_query>") else {
        return content.to_string();
    };
    let after = &content[start + "<user_query>".len()..];
    let inner = match after.find("</user_query>") {
        Some(end) => &after[..end],
        None => after,
    };
    inner.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext<'static> {
        ParseContext {
            project_hint: Some("webshop"),
            machine: "testhost",
            fork_threshold: 3,
        }
    }

    #[test]
    fn test_text_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t-100.txt");
        std::fs::write(
            &path,
            concat!(
                "user:\n",
                "<user_query>make the header sticky</user_query>\n",
                "assistant:\n",
                "[Thinking]\n",
                "css change needed\n",
                "[Tool call] edit_file\n",
                "[Tool result]\n",
                "applied 3 edits\n",
                "done, the header is sticky now\n",
            ),
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.session.id, "cursor:t-100");
        assert_eq!(r.session.project, "webshop");
        assert_eq!(r.session.message_count, 2);
        assert_eq!(r.messages[0].content, "make the header sticky");
        let assistant = &r.messages[1];
        assert!(assistant.has_thinking);
        assert!(assistant.has_tool_use);
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].tool_name, "edit_file");
        assert_eq!(assistant.tool_results.len(), 1);
        assert!(assistant.tool_results[0].content_length > 0);
    }

    #[test]
    fn test_jsonl_variant_detected_by_sniff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t-200.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"role":"user","content":"check the login flow"}"#, "\n",
                r#"{"role":"assistant","content":[{"type":"text","text":"looks fine"}]}"#, "\n",
            ),
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        let r = &results[0];
        assert_eq!(r.session.message_count, 2);
        assert_eq!(r.messages[0].content, "check the login flow");
        assert_eq!(r.messages[1].content, "looks fine");
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t-300.txt");
        std::fs::write(&path, "").unwrap();
        assert!(parse(&path, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }

    #[test]
    fn test_result_lines_do_not_leak_into_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t-400.txt");
        std::fs::write(
            &path,
            concat!(
                "assistant:\n",
                "[Tool call] run_terminal_cmd\n",
                "[Tool result]\n",
                "lots of output here\n",
                "user:\n",
                "<user_query>next step</user_query>\n",
            ),
        )
        .unwrap();

        let results = parse(&path, &ctx()).unwrap();
        let assistant = &results[0].messages[0];
        assert!(!assistant.content.contains("lots of output"));
        assert_eq!(results[0].messages[1].content, "next step");
    }
}
