//! Opencode database parser
//!
//! Sessions live in a SQLite database rather than files. The database is
//! opened read-only with a busy timeout; `project`, `session`, `message`,
//! and `part` tables are joined into the common model. Part types `text`,
//! `tool`, and `reasoning` are translated; other part types are ignored.
//!
//! Source identity is synthetic: `<db-path>#<session-id>`, with the
//! session's `time_updated` standing in for a file mtime.

use crate::discovery::{open_opencode_db, split_synthetic_db_path};
use crate::error::{Error, Result};
use crate::parsers::{assemble, ParseContext};
use crate::project::project_from_cwd;
use crate::timestamp::from_epoch_millis;
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship, ToolCall};
use rusqlite::OptionalExtension;
use std::path::Path;

struct SessionRow {
    id: String,
    project_id: Option<String>,
    parent_id: Option<String>,
    time_created: Option<i64>,
    time_updated: Option<i64>,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let (db_path, session_id) = split_synthetic_db_path(path).ok_or_else(|| Error::Parse {
        agent: AgentKind::Opencode.as_str().to_string(),
        message: format!("not a database session path: {}", path.display()),
    })?;
    let conn = open_opencode_db(&db_path)?;

    let row = conn
        .query_row(
            "SELECT id, project_id, parent_id, time_created, time_updated
             FROM session WHERE id = ?1",
            [&session_id],
            |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    parent_id: row.get(2)?,
                    time_created: row.get(3)?,
                    time_updated: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::SessionNotFound(session_id.clone()))?;

    let project = row
        .project_id
        .as_deref()
        .and_then(|pid| {
            conn.query_row(
                "SELECT worktree FROM project WHERE id = ?1",
                [pid],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()
            .ok()
            .flatten()
            .flatten()
        })
        .map(|worktree| project_from_cwd(Path::new(&worktree)))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let messages = load_messages(&conn, &row.id)?;

    let session = Session {
        id: AgentKind::Opencode.prefixed_id(&row.id),
        project,
        machine: ctx.machine.to_string(),
        agent: AgentKind::Opencode,
        parent_id: row
            .parent_id
            .filter(|p| !p.is_empty())
            .map(|p| AgentKind::Opencode.prefixed_id(&p)),
        relationship: SessionRelationship::None,
        first_message: String::new(),
        started_at: row.time_created.and_then(from_epoch_millis),
        ended_at: row.time_updated.and_then(from_epoch_millis),
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    Ok(vec![assemble(session, messages)])
}

fn load_messages(conn: &rusqlite::Connection, session_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, role, time_created FROM message
         WHERE session_id = ?1 ORDER BY time_created, id",
    )?;
    let rows = stmt
        .query_map([session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut part_stmt = conn.prepare(
        "SELECT id, type, text, tool FROM part
         WHERE message_id = ?1 ORDER BY time_created, id",
    )?;

    let mut messages = Vec::new();
    for (message_id, role_str, time_created) in rows {
        let role = match role_str.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => continue,
        };
        let mut msg = Message {
            session_id: String::new(),
            ordinal: 0,
            role,
            content: String::new(),
            timestamp: time_created.and_then(from_epoch_millis),
            has_thinking: false,
            has_tool_use: false,
            content_length: 0,
            tool_calls: vec![],
            tool_results: vec![],
        };
        let mut parts = Vec::new();
        let part_rows = part_stmt
            .query_map([&message_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (part_id, part_type, text, tool) in part_rows {
            match part_type.as_str() {
                "text" => {
                    if let Some(t) = text.filter(|t| !t.is_empty()) {
                        parts.push(t);
                    }
                }
                "reasoning" => {
                    if let Some(t) = text.filter(|t| !t.is_empty()) {
                        msg.has_thinking = true;
                        parts.push(format!("[Thinking]\n{}", t));
                    }
                }
                "tool" => {
                    let Some(name) = tool.filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    msg.has_tool_use = true;
                    parts.push(format!("[{}]", name));
                    msg.tool_calls.push(ToolCall {
                        tool_use_id: Some(part_id),
                        tool_name: name.clone(),
                        category: crate::taxonomy::categorize_tool(&name),
                        input_json: "{}".to_string(),
                        skill_name: None,
                        subagent_session_id: None,
                    });
                }
                _ => {}
            }
        }
        msg.content = parts.join("\n");
        msg.content_length = msg.content.len() as i64;
        if msg.content.is_empty() && msg.tool_calls.is_empty() {
            continue;
        }
        messages.push(msg);
    }
    Ok(messages)
}

/// The session's `time_updated` in nanoseconds, the database-backed
/// equivalent of a file mtime for the fingerprint gate.
pub fn session_mtime_ns(path: &Path) -> Result<i64> {
    let (db_path, session_id) = split_synthetic_db_path(path).ok_or_else(|| Error::Parse {
        agent: AgentKind::Opencode.as_str().to_string(),
        message: format!("not a database session path: {}", path.display()),
    })?;
    let conn = open_opencode_db(&db_path)?;
    let millis: i64 = conn
        .query_row(
            "SELECT COALESCE(time_updated, 0) FROM session WHERE id = ?1",
            [&session_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::SessionNotFound(session_id))?;
    Ok(millis.saturating_mul(1_000_000))
}
