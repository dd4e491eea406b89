//! Amp thread JSON parser
//!
//! One `T-*.json` document per thread: `{id, created, title, messages,
//! env.initial.trees, meta}`. The `id` is required; a document without one
//! is rejected as a whole. `created` is an epoch-milliseconds number.

use crate::error::{Error, Result};
use crate::extract::{extract_content, is_synthetic_user_text};
use crate::linereader::read_document;
use crate::parsers::{assemble, ParseContext};
use crate::project::project_from_cwd;
use crate::timestamp::from_epoch_millis;
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ThreadDoc {
    id: Option<String>,
    created: Option<i64>,
    messages: Vec<ThreadMessage>,
    env: Option<ThreadEnv>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ThreadMessage {
    role: Option<String>,
    content: Value,
    #[serde(alias = "createdAt", alias = "ts")]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ThreadEnv {
    initial: Option<ThreadEnvInitial>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ThreadEnvInitial {
    trees: Vec<String>,
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let bytes = read_document(path, None)?;
    let doc: ThreadDoc = serde_json::from_slice(&bytes).map_err(|e| Error::Parse {
        agent: AgentKind::Amp.as_str().to_string(),
        message: format!("invalid thread document {}: {}", path.display(), e),
    })?;

    let Some(raw_id) = doc.id.clone() else {
        return Err(Error::Parse {
            agent: AgentKind::Amp.as_str().to_string(),
            message: format!("thread document missing id: {}", path.display()),
        });
    };

    let mut messages = Vec::new();
    for raw in &doc.messages {
        let role = match raw.role.as_deref() {
            Some("user" | "human") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };
        let extracted = extract_content(&raw.content);
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
            timestamp: raw.timestamp.and_then(from_epoch_millis),
            has_thinking: extracted.has_thinking,
            has_tool_use: extracted.has_tool_use,
            tool_calls: extracted.tool_calls,
            tool_results: extracted.tool_results,
        });
    }

    let project = doc
        .env
        .as_ref()
        .and_then(|e| e.initial.as_ref())
        .and_then(|i| i.trees.first())
        .map(|tree| project_from_cwd(Path::new(tree)))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let session = Session {
        id: AgentKind::Amp.prefixed_id(&raw_id),
        project,
        machine: ctx.machine.to_string(),
        agent: AgentKind::Amp,
        parent_id: None,
        relationship: SessionRelationship::None,
        first_message: String::new(),
        started_at: doc.created.and_then(from_epoch_millis),
        ended_at: None,
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    Ok(vec![assemble(session, messages)])
}
