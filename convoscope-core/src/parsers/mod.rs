//! Format-specific parsers
//!
//! One module per agent. Parsers are pure functions over file bytes: given
//! the same input they produce the same [`ParseResult`] list, with no
//! clocks and no global state. Malformed content inside an otherwise valid
//! file is skipped, never fatal; a file is only rejected as a whole when it
//! cannot be opened, scanned, or (for single-document formats) parsed at
//! all.

pub mod amp;
pub mod claude;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod gemini;
pub mod opencode;
pub mod pi;

use crate::error::Result;
use crate::types::{
    first_message_preview, AgentKind, Message, ParseResult, Role, Session,
};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Caller-supplied context shared by all parsers.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Project name pre-extracted by discovery, when the layout encodes one
    pub project_hint: Option<&'a str>,
    /// Opaque machine label stored verbatim on every session
    pub machine: &'a str,
    /// User-turn gap above which a branch becomes its own fork session
    pub fork_threshold: usize,
}

impl Default for ParseContext<'_> {
    fn default() -> Self {
        Self {
            project_hint: None,
            machine: "localhost",
            fork_threshold: claude::FORK_THRESHOLD,
        }
    }
}

/// Parse one source file with the parser for `agent`.
pub fn parse_file(agent: AgentKind, path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    match agent {
        AgentKind::Claude => claude::parse(path, ctx),
        AgentKind::Codex => codex::parse(path, ctx),
        AgentKind::Copilot => copilot::parse(path, ctx),
        AgentKind::Gemini => gemini::parse(path, ctx),
        AgentKind::Opencode => opencode::parse(path, ctx),
        AgentKind::Cursor => cursor::parse(path, ctx),
        AgentKind::Amp => amp::parse(path, ctx),
        AgentKind::Pi => pi::parse(path, ctx),
    }
}

/// Assign contiguous ordinals and stamp the session id onto a message list.
pub(crate) fn number_messages(session_id: &str, messages: &mut [Message]) {
    for (i, msg) in messages.iter_mut().enumerate() {
        msg.session_id = session_id.to_string();
        msg.ordinal = i as i64;
    }
}

/// Count real user turns: user-role messages that carry no tool results.
/// Synthetic user messages never reach the list, so they need no handling
/// here.
pub(crate) fn user_turn_count(messages: &[Message]) -> i64 {
    messages
        .iter()
        .filter(|m| m.role == Role::User && m.tool_results.is_empty())
        .count() as i64
}

/// Preview of the first real user turn.
pub(crate) fn first_user_preview(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User && m.tool_results.is_empty() && !m.content.is_empty())
        .map(|m| first_message_preview(&m.content))
        .unwrap_or_default()
}

/// `[min, max]` of the message timestamps.
pub(crate) fn message_envelope(
    messages: &[Message],
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut start = None;
    let mut end = None;
    for ts in messages.iter().filter_map(|m| m.timestamp) {
        start = Some(match start {
            None => ts,
            Some(s) if ts < s => ts,
            Some(s) => s,
        });
        end = Some(match end {
            None => ts,
            Some(e) if ts > e => ts,
            Some(e) => e,
        });
    }
    (start, end)
}

/// Fill the session counters and preview from its message list and wrap
/// both into a [`ParseResult`].
pub(crate) fn assemble(mut session: Session, mut messages: Vec<Message>) -> ParseResult {
    number_messages(&session.id, &mut messages);
    session.message_count = messages.len() as i64;
    session.user_message_count = user_turn_count(&messages);
    if session.first_message.is_empty() {
        session.first_message = first_user_preview(&messages);
    }
    if session.started_at.is_none() || session.ended_at.is_none() {
        let (start, end) = message_envelope(&messages);
        session.started_at = session.started_at.or(start);
        session.ended_at = session.ended_at.or(end);
    }
    if let (Some(s), Some(e)) = (session.started_at, session.ended_at) {
        if e < s {
            session.ended_at = Some(s);
        }
    }
    ParseResult { session, messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionRelationship;

    fn msg(role: Role, content: &str) -> Message {
        Message {
            session_id: String::new(),
            ordinal: 0,
            role,
            content: content.to_string(),
            timestamp: None,
            has_thinking: false,
            has_tool_use: false,
            content_length: content.len() as i64,
            tool_calls: vec![],
            tool_results: vec![],
        }
    }

    #[test]
    fn test_assemble_numbers_and_counts() {
        let session = Session {
            id: "s1".into(),
            project: "p".into(),
            machine: "m".into(),
            agent: AgentKind::Claude,
            parent_id: None,
            relationship: SessionRelationship::None,
            first_message: String::new(),
            started_at: None,
            ended_at: None,
            message_count: 0,
            user_message_count: 0,
            source_file: "f".into(),
        };
        let messages = vec![
            msg(Role::User, "first question here"),
            msg(Role::Assistant, "answer"),
            msg(Role::User, "followup"),
        ];
        let result = assemble(session, messages);
        assert_eq!(result.session.message_count, 3);
        assert_eq!(result.session.user_message_count, 2);
        assert_eq!(result.session.first_message, "first question here");
        let ordinals: Vec<i64> = result.messages.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(result.messages.iter().all(|m| m.session_id == "s1"));
    }

    #[test]
    fn test_tool_result_messages_not_user_turns() {
        let mut carrier = msg(Role::User, "");
        carrier.tool_results.push(crate::types::ToolResult {
            tool_use_id: "tu".into(),
            content_length: 4,
        });
        let messages = vec![msg(Role::User, "real"), carrier];
        assert_eq!(user_turn_count(&messages), 1);
    }
}
