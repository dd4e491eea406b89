//! Reference-agent JSONL parser
//!
//! Each line is one entry with `uuid` and `parentUuid` fields. A session is
//! normally a linear chain, but a user can rewind and branch from an
//! earlier entry, so the parser walks the tree and distinguishes:
//!
//! - **Small-gap retry** (the abandoned branch has at most
//!   [`FORK_THRESHOLD`] user turns): the latest child is the canonical
//!   continuation and older children are discarded.
//! - **Large-gap fork**: both branches are substantive; the main session
//!   follows the first child and every other child is emitted as its own
//!   session with `relationship = fork`, parented to whichever session
//!   owned the walk when the fork was discovered. Forks nest.
//!
//! Any malformed tree (an entry without a uuid, zero or multiple roots, an
//! unresolvable or duplicate parent) falls back to linear parsing in file
//! order. Messages are never dropped because the tree failed validation.

use crate::error::{Error, Result};
use crate::extract::{extract_content, is_synthetic_user_text, ExtractedContent};
use crate::linereader::LineReader;
use crate::parsers::{assemble, ParseContext};
use crate::project::{normalize_name, project_from_cwd, strip_worktree_suffix};
use crate::taxonomy::ToolCategory;
use crate::timestamp::parse_timestamp;
use crate::types::{AgentKind, Message, ParseResult, Role, Session, SessionRelationship};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// Largest user-turn gap that still counts as a retry rather than a fork.
pub const FORK_THRESHOLD: usize = 3;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    uuid: Option<String>,
    parent_uuid: Option<String>,
    session_id: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    is_meta: Option<bool>,
    is_compact_summary: Option<bool>,
    operation: Option<String>,
    tool_use_id: Option<String>,
    task_id: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    User,
    Assistant,
    Other,
}

struct Entry {
    uuid: Option<String>,
    parent: Option<String>,
    kind: EntryKind,
    timestamp: Option<DateTime<Utc>>,
    record: RawRecord,
}

fn xml_pair_re() -> (&'static Regex, &'static Regex) {
    static TOOL: OnceLock<Regex> = OnceLock::new();
    static TASK: OnceLock<Regex> = OnceLock::new();
    (
        TOOL.get_or_init(|| Regex::new(r"<tool_use_id>([^<]+)</tool_use_id>").unwrap()),
        TASK.get_or_init(|| Regex::new(r"<task_id>([^<]+)</task_id>").unwrap()),
    )
}

pub fn parse(path: &Path, ctx: &ParseContext) -> Result<Vec<ParseResult>> {
    let mut reader = LineReader::open(path)?;

    let mut entries: Vec<Entry> = Vec::new();
    let mut enqueue_map: HashMap<String, String> = HashMap::new();
    let mut env_start: Option<DateTime<Utc>> = None;
    let mut env_end: Option<DateTime<Utc>> = None;
    let mut header_session_id: Option<String> = None;
    let mut cwd: Option<String> = None;
    let mut git_branch: Option<String> = None;

    while let Some(line) = reader.next_line() {
        let Ok(record) = serde_json::from_str::<RawRecord>(&line) else {
            continue;
        };

        let timestamp = record.timestamp.as_deref().and_then(parse_timestamp);
        if let Some(ts) = timestamp {
            env_start = Some(env_start.map_or(ts, |s| s.min(ts)));
            env_end = Some(env_end.map_or(ts, |e| e.max(ts)));
        }

        if header_session_id.is_none() {
            header_session_id = record.session_id.clone();
        }
        if cwd.is_none() {
            cwd = record.cwd.clone();
        }
        if git_branch.is_none() {
            git_branch = record.git_branch.clone();
        }

        let kind = match record.record_type.as_deref() {
            Some("user") => EntryKind::User,
            Some("assistant") => EntryKind::Assistant,
            Some("queue-operation") => {
                if record.operation.as_deref() == Some("enqueue") {
                    collect_enqueue_pair(&record, &line, &mut enqueue_map);
                }
                EntryKind::Other
            }
            _ => EntryKind::Other,
        };

        let parent = record
            .parent_uuid
            .clone()
            .filter(|p| !p.is_empty());
        entries.push(Entry {
            uuid: record.uuid.clone().filter(|u| !u.is_empty()),
            parent,
            kind,
            timestamp,
            record,
        });
    }

    if let Some(err) = reader.err() {
        return Err(Error::Parse {
            agent: AgentKind::Claude.as_str().to_string(),
            message: format!("scan failed for {}: {}", path.display(), err),
        });
    }

    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let derived_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();
    let parent_id = header_session_id
        .as_ref()
        .filter(|h| **h != derived_id)
        .cloned();
    let project = cwd
        .as_deref()
        .map(|c| derive_project(c, git_branch.as_deref()))
        .or_else(|| ctx.project_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let make_session = |id: String,
                        parent: Option<String>,
                        relationship: SessionRelationship| Session {
        id,
        project: project.clone(),
        machine: ctx.machine.to_string(),
        agent: AgentKind::Claude,
        parent_id: parent,
        relationship,
        first_message: String::new(),
        started_at: None,
        ended_at: None,
        message_count: 0,
        user_message_count: 0,
        source_file: path.display().to_string(),
    };

    let walk = DagWalk::build(&entries);
    let mut results = Vec::new();

    match walk {
        None => {
            // Linear fallback: file order, one session.
            let messages = messages_from(entries.iter().collect::<Vec<_>>(), &enqueue_map);
            let mut session = make_session(derived_id, parent_id, SessionRelationship::None);
            session.started_at = env_start;
            session.ended_at = env_end;
            results.push(assemble(session, messages));
        }
        Some(walk) => {
            walk.emit(
                walk.root,
                derived_id.clone(),
                parent_id,
                SessionRelationship::None,
                true,
                &derived_id,
                &entries,
                &enqueue_map,
                ctx.fork_threshold,
                (env_start, env_end),
                &make_session,
                &mut results,
            );
        }
    }

    Ok(results)
}

/// Project name for a recorded cwd. A worktree checkout that no longer
/// exists on disk gets its `-<branch>` suffix stripped so it folds into the
/// primary project.
fn derive_project(cwd: &str, git_branch: Option<&str>) -> String {
    let path = Path::new(cwd);
    if !path.is_dir() {
        if let Some(branch) = git_branch {
            let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if let Some(stripped) = strip_worktree_suffix(name, branch) {
                return normalize_name(stripped);
            }
        }
    }
    project_from_cwd(path)
}

fn collect_enqueue_pair(record: &RawRecord, line: &str, map: &mut HashMap<String, String>) {
    let mut tool_use_id = record.tool_use_id.clone();
    let mut task_id = record.task_id.clone();
    if tool_use_id.is_none() || task_id.is_none() {
        let (tool_re, task_re) = xml_pair_re();
        if tool_use_id.is_none() {
            tool_use_id = tool_re.captures(line).map(|c| c[1].to_string());
        }
        if task_id.is_none() {
            task_id = task_re.captures(line).map(|c| c[1].to_string());
        }
    }
    if let (Some(tool), Some(task)) = (tool_use_id, task_id) {
        map.insert(tool, task);
    }
}

// ============================================
// DAG walk
// ============================================

struct DagWalk {
    root: usize,
    children: HashMap<String, Vec<usize>>,
}

impl DagWalk {
    /// Validate the tree. `None` means fall back to linear parsing.
    fn build(entries: &[Entry]) -> Option<DagWalk> {
        // Every user/assistant entry must carry a uuid.
        if entries
            .iter()
            .any(|e| e.kind != EntryKind::Other && e.uuid.is_none())
        {
            return None;
        }

        let mut uuid_to_idx: HashMap<&str, usize> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if let Some(uuid) = entry.uuid.as_deref() {
                if uuid_to_idx.insert(uuid, i).is_some() {
                    return None; // duplicate uuid
                }
            }
        }

        let mut roots = Vec::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.uuid.is_none() {
                continue;
            }
            match entry.parent.as_deref() {
                None => roots.push(i),
                Some(parent) => {
                    if !uuid_to_idx.contains_key(parent) {
                        return None; // unresolvable parent
                    }
                    children.entry(parent.to_string()).or_default().push(i);
                }
            }
        }

        if roots.len() != 1 {
            return None;
        }
        Some(DagWalk {
            root: roots[0],
            children,
        })
    }

    fn children_of<'a>(&'a self, entries: &[Entry], idx: usize) -> &'a [usize] {
        entries[idx]
            .uuid
            .as_deref()
            .and_then(|u| self.children.get(u))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Follow one branch from `start`. Returns the entry chain plus the
    /// start indices of any large-gap forks discovered along the way.
    fn collect_branch(
        &self,
        entries: &[Entry],
        start: usize,
        threshold: usize,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut chain = Vec::new();
        let mut forks = Vec::new();
        let mut current = start;
        loop {
            chain.push(current);
            let kids = self.children_of(entries, current);
            match kids.len() {
                0 => break,
                1 => current = kids[0],
                _ => {
                    let gap = self.user_turns_on_first_child_chain(entries, kids[0]);
                    if gap <= threshold {
                        // Retry: the latest child is canonical, older
                        // children are abandoned.
                        current = *kids.last().unwrap();
                    } else {
                        forks.extend_from_slice(&kids[1..]);
                        current = kids[0];
                    }
                }
            }
        }
        (chain, forks)
    }

    /// User turns along the chain that always takes the first child.
    fn user_turns_on_first_child_chain(&self, entries: &[Entry], start: usize) -> usize {
        let mut count = 0;
        let mut current = start;
        loop {
            if is_real_user_turn(&entries[current]) {
                count += 1;
            }
            let kids = self.children_of(entries, current);
            if kids.is_empty() {
                break;
            }
            current = kids[0];
        }
        count
    }

    /// Emit the branch starting at `start` and, depth-first, every fork
    /// discovered inside it. Fork ids derive from the root session id plus
    /// the fork's first entry uuid; a fork's parent is the session that
    /// owned the walk when the fork was found.
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        start: usize,
        session_id: String,
        parent_id: Option<String>,
        relationship: SessionRelationship,
        is_main: bool,
        root_session_id: &str,
        entries: &[Entry],
        enqueue_map: &HashMap<String, String>,
        threshold: usize,
        envelope: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
        make_session: &dyn Fn(String, Option<String>, SessionRelationship) -> Session,
        out: &mut Vec<ParseResult>,
    ) {
        let (chain, forks) = self.collect_branch(entries, start, threshold);
        let branch_entries: Vec<&Entry> = chain.iter().map(|&i| &entries[i]).collect();
        let messages = messages_from(branch_entries, enqueue_map);

        let mut session = make_session(session_id.clone(), parent_id, relationship);
        if is_main {
            // The global envelope also absorbs non-message events, so a
            // trailing queue operation widens the main session.
            session.started_at = envelope.0;
            session.ended_at = envelope.1;
        }
        out.push(assemble(session, messages));

        for fork_start in forks {
            let first_uuid = entries[fork_start].uuid.as_deref().unwrap_or("fork");
            let fork_id = format!("{}-{}", root_session_id, first_uuid);
            self.emit(
                fork_start,
                fork_id,
                Some(session_id.clone()),
                SessionRelationship::Fork,
                false,
                root_session_id,
                entries,
                enqueue_map,
                threshold,
                envelope,
                make_session,
                out,
            );
        }
    }
}

// ============================================
// Message extraction
// ============================================

fn is_real_user_turn(entry: &Entry) -> bool {
    if entry.kind != EntryKind::User {
        return false;
    }
    let rec = &entry.record;
    if rec.is_meta == Some(true) || rec.is_compact_summary == Some(true) {
        return false;
    }
    let Some(content) = rec.message.as_ref().and_then(|m| m.content.as_ref()) else {
        return false;
    };
    match content {
        Value::String(s) => !s.trim().is_empty() && !is_synthetic_user_text(s),
        Value::Array(blocks) => {
            let has_tool_result = blocks
                .iter()
                .any(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result"));
            if has_tool_result {
                return false;
            }
            blocks.iter().any(|b| {
                b.get("type").and_then(|t| t.as_str()) == Some("text")
                    && b.get("text")
                        .and_then(|t| t.as_str())
                        .is_some_and(|t| !t.trim().is_empty() && !is_synthetic_user_text(t))
            })
        }
        _ => false,
    }
}

fn messages_from(entries: Vec<&Entry>, enqueue_map: &HashMap<String, String>) -> Vec<Message> {
    let mut messages: Vec<Message> = entries.into_iter().filter_map(entry_to_message).collect();
    annotate_subagents(&mut messages, enqueue_map);
    messages
}

fn entry_to_message(entry: &Entry) -> Option<Message> {
    let role = match entry.kind {
        EntryKind::User => Role::User,
        EntryKind::Assistant => Role::Assistant,
        EntryKind::Other => return None,
    };
    let rec = &entry.record;
    if role == Role::User && (rec.is_meta == Some(true) || rec.is_compact_summary == Some(true)) {
        return None;
    }
    let content = rec.message.as_ref().and_then(|m| m.content.as_ref())?;
    let extracted = extract_content(content);
    if role == Role::User && !extracted.text.is_empty() && is_synthetic_user_text(&extracted.text) {
        return None;
    }
    if extracted.is_empty() {
        return None;
    }
    Some(to_message(role, entry.timestamp, extracted))
}

fn to_message(role: Role, timestamp: Option<DateTime<Utc>>, ex: ExtractedContent) -> Message {
    Message {
        session_id: String::new(),
        ordinal: 0,
        role,
        content_length: ex.text.len() as i64,
        content: ex.text,
        timestamp,
        has_thinking: ex.has_thinking,
        has_tool_use: ex.has_tool_use,
        tool_calls: ex.tool_calls,
        tool_results: ex.tool_results,
    }
}

/// Second pass: queue-operation entries may appear after the tool_use they
/// describe, so subagent links are applied to the already-extracted list.
fn annotate_subagents(messages: &mut [Message], enqueue_map: &HashMap<String, String>) {
    if enqueue_map.is_empty() {
        return;
    }
    for msg in messages.iter_mut() {
        for call in msg.tool_calls.iter_mut() {
            if call.category != ToolCategory::Task {
                continue;
            }
            let Some(id) = call.tool_use_id.as_deref() else {
                continue;
            };
            if let Some(task_id) = enqueue_map.get(id) {
                call.subagent_session_id = Some(format!("agent-{}", task_id));
            }
        }
    }
}
