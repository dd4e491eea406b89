//! Core domain types for convoscope
//!
//! These types form the canonical data model that normalizes session
//! transcripts from all supported AI coding agents.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One conversation between a user and an agent, as recorded by that agent |
//! | **Message** | One turn in a session, produced by a user or an assistant |
//! | **Tool call** | A structured action requested by the assistant, embedded in a message |
//! | **Tool result** | The output of a tool call, carried in the next user-role message |
//! | **Fork** | A branch in a session's uuid/parent-uuid tree substantial enough to become its own session |
//! | **Subagent** | A delegated sub-conversation spawned by a Task tool call |
//! | **Project** | A normalized short name for the working directory a session started in |
//! | **Machine** | A caller-supplied label (usually the hostname) disambiguating multi-host indexes |

use crate::taxonomy::ToolCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum length of the stored first-message preview, in characters.
pub const PREVIEW_MAX_LEN: usize = 120;

// ============================================
// Agents
// ============================================

/// Supported AI coding agents.
///
/// The variant order here is the registry order: discovery, sync statistics,
/// and prefix resolution all iterate agents in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Copilot,
    Gemini,
    Opencode,
    Cursor,
    Amp,
    Pi,
}

impl AgentKind {
    /// Returns the identifier used in database storage and session-id prefixes
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Copilot => "copilot",
            AgentKind::Gemini => "gemini",
            AgentKind::Opencode => "opencode",
            AgentKind::Cursor => "cursor",
            AgentKind::Amp => "amp",
            AgentKind::Pi => "pi",
        }
    }

    /// Returns the display name for this agent
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Claude => "Claude Code",
            AgentKind::Codex => "Codex CLI",
            AgentKind::Copilot => "Copilot CLI",
            AgentKind::Gemini => "Gemini CLI",
            AgentKind::Opencode => "OpenCode",
            AgentKind::Cursor => "Cursor",
            AgentKind::Amp => "Amp",
            AgentKind::Pi => "Pi",
        }
    }

    /// Session-id prefix for this agent. The reference agent uses bare ids
    /// for historical reasons, so its prefix is empty.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            AgentKind::Claude => "",
            other => other.as_str(),
        }
    }

    /// Apply this agent's prefix to a raw source-level id.
    ///
    /// Idempotent: an already-prefixed id is returned unchanged.
    pub fn prefixed_id(&self, raw: &str) -> String {
        let prefix = self.id_prefix();
        if prefix.is_empty() {
            return raw.to_string();
        }
        let tagged = format!("{}:", prefix);
        if raw.starts_with(&tagged) {
            raw.to_string()
        } else {
            format!("{}{}", tagged, raw)
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            "copilot" => Ok(AgentKind::Copilot),
            "gemini" => Ok(AgentKind::Gemini),
            "opencode" => Ok(AgentKind::Opencode),
            "cursor" => Ok(AgentKind::Cursor),
            "amp" => Ok(AgentKind::Amp),
            "pi" => Ok(AgentKind::Pi),
            _ => Err(format!("unknown agent: {}", s)),
        }
    }
}

// ============================================
// Sessions
// ============================================

/// How a session relates to its parent session, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRelationship {
    /// No parent
    #[default]
    None,
    /// Resumed or continued from the parent session
    Continuation,
    /// Spawned by a Task/Agent tool call in the parent
    Subagent,
    /// A rewind branch substantial enough to stand alone
    Fork,
}

impl SessionRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRelationship::None => "none",
            SessionRelationship::Continuation => "continuation",
            SessionRelationship::Subagent => "subagent",
            SessionRelationship::Fork => "fork",
        }
    }
}

impl std::str::FromStr for SessionRelationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(SessionRelationship::None),
            "continuation" => Ok(SessionRelationship::Continuation),
            "subagent" => Ok(SessionRelationship::Subagent),
            "fork" => Ok(SessionRelationship::Fork),
            _ => Err(format!("unknown session relationship: {}", s)),
        }
    }
}

/// One conversation between a user and an agent.
///
/// Unique by `id`. Ids from agents other than the reference agent carry the
/// agent's prefix (`codex:...`, `amp:T-...`); the parent-edge graph across
/// sessions must stay acyclic, which the store verifies on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique identifier (prefixed per agent)
    pub id: String,
    /// Normalized project short name
    pub project: String,
    /// Caller-supplied machine label, stored verbatim
    pub machine: String,
    /// Which agent recorded this session
    pub agent: AgentKind,
    /// Parent session id, when this session continues or branches another
    pub parent_id: Option<String>,
    /// How this session relates to its parent
    pub relationship: SessionRelationship,
    /// Truncated first user line, for list views
    pub first_message: String,
    /// When the session started
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended (last observed activity)
    pub ended_at: Option<DateTime<Utc>>,
    /// Total message count after filtering
    pub message_count: i64,
    /// Count of real user turns only
    pub user_message_count: i64,
    /// Originating file (synthetic `<db>#<id>` for database-backed agents)
    pub source_file: String,
}

// ============================================
// Messages
// ============================================

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// A structured action requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates with a later [`ToolResult`] in the same session
    pub tool_use_id: Option<String>,
    /// Tool name as recorded by the agent
    pub tool_name: String,
    /// Category computed from the fixed taxonomy table
    pub category: ToolCategory,
    /// Raw tool input, preserved verbatim for the read side
    pub input_json: String,
    /// Skill name when the call invokes a named skill
    pub skill_name: Option<String>,
    /// Session id of the subagent this call spawned, when correlated
    pub subagent_session_id: Option<String>,
}

/// The recorded outcome of a tool call. Only the length is kept;
/// full result bodies stay in the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content_length: i64,
}

/// One turn in a session. Immutable once written for a given
/// `(session_id, ordinal)`; re-parsing a file replaces all of a session's
/// messages atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub session_id: String,
    /// Contiguous from 0 within a session, after filtering
    pub ordinal: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub has_thinking: bool,
    pub has_tool_use: bool,
    pub content_length: i64,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
}

// ============================================
// Parsing and discovery
// ============================================

/// Everything a parser extracted for one session: the session header plus
/// its ordered message list. One file may yield several results when the
/// transcript contains DAG forks.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub session: Session,
    pub messages: Vec<Message>,
}

/// A candidate source file found by discovery. Listing only; nothing is
/// parsed until the sync engine picks the file up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path (synthetic `<db-path>#<id>` for database-backed agents)
    pub path: PathBuf,
    /// Project name pre-extracted from the directory layout, when the
    /// layout encodes one
    pub project_hint: Option<String>,
    pub agent: AgentKind,
}

/// Identity of a source file's last indexed state. A file whose current
/// mtime matches the stored fingerprint is skipped on re-sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub path: String,
    pub size: i64,
    pub mtime_ns: i64,
    /// Set for agents where identical transcripts can appear under
    /// different paths (cursor)
    pub content_hash: Option<String>,
}

// ============================================
// Sync reporting
// ============================================

/// Per-agent counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub discovered: usize,
    pub synced: usize,
    pub skipped: usize,
    pub errored: usize,
}

/// Result of a sync run. Agent entries appear in registry order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub agents: Vec<(AgentKind, AgentStats)>,
    /// Individual file failures (file path, error message)
    pub errors: Vec<(PathBuf, String)>,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl SyncReport {
    /// Mutable counters for an agent, inserting the entry on first use.
    pub fn stats_mut(&mut self, agent: AgentKind) -> &mut AgentStats {
        if let Some(idx) = self.agents.iter().position(|(a, _)| *a == agent) {
            return &mut self.agents[idx].1;
        }
        self.agents.push((agent, AgentStats::default()));
        &mut self.agents.last_mut().unwrap().1
    }

    pub fn total_discovered(&self) -> usize {
        self.agents.iter().map(|(_, s)| s.discovered).sum()
    }

    pub fn total_synced(&self) -> usize {
        self.agents.iter().map(|(_, s)| s.synced).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.agents.iter().map(|(_, s)| s.skipped).sum()
    }

    pub fn total_errored(&self) -> usize {
        self.agents.iter().map(|(_, s)| s.errored).sum()
    }

    /// Fold another report into this one, preserving registry order.
    pub fn merge(&mut self, other: SyncReport) {
        for (agent, stats) in other.agents {
            let mine = self.stats_mut(agent);
            mine.discovered += stats.discovered;
            mine.synced += stats.synced;
            mine.skipped += stats.skipped;
            mine.errored += stats.errored;
        }
        self.errors.extend(other.errors);
        self.cancelled |= other.cancelled;
    }
}

// ============================================
// Helpers
// ============================================

/// Check a session id at a lookup boundary. Only `[A-Za-z0-9_:-]` is
/// accepted; anything else is rejected before it can reach the filesystem
/// or a SQL query.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b':')
}

/// Truncate a string to `max_len` characters with ellipsis, respecting
/// char boundaries.
pub fn truncate_preview(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let target = max_len.saturating_sub(3);
    let cut: String = s.chars().take(target).collect();
    format!("{}...", cut)
}

/// Build the stored first-message preview from the first real user turn.
pub fn first_message_preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("");
    truncate_preview(first_line, PREVIEW_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_id() {
        assert_eq!(AgentKind::Claude.prefixed_id("abc-123"), "abc-123");
        assert_eq!(AgentKind::Codex.prefixed_id("abc-123"), "codex:abc-123");
        assert_eq!(
            AgentKind::Codex.prefixed_id("codex:abc-123"),
            "codex:abc-123"
        );
        assert_eq!(AgentKind::Amp.prefixed_id("T-42"), "amp:T-42");
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("b4749c81-937a-4bd4-b62c-9d78905f0975"));
        assert!(is_valid_session_id("codex:abc_123"));
        assert!(is_valid_session_id("amp:T-42"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc/passwd"));
        assert!(!is_valid_session_id("id with spaces"));
        assert!(!is_valid_session_id("drop';--"));
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 10), "short");
        let long = "x".repeat(200);
        let cut = truncate_preview(&long, PREVIEW_MAX_LEN);
        assert_eq!(cut.chars().count(), PREVIEW_MAX_LEN);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_first_message_preview_takes_first_line() {
        assert_eq!(first_message_preview("fix the bug\nin detail"), "fix the bug");
    }

    #[test]
    fn test_report_merge_accumulates() {
        let mut a = SyncReport::default();
        a.stats_mut(AgentKind::Claude).synced = 2;
        let mut b = SyncReport::default();
        b.stats_mut(AgentKind::Claude).synced = 3;
        b.stats_mut(AgentKind::Pi).skipped = 1;
        a.merge(b);
        assert_eq!(a.total_synced(), 5);
        assert_eq!(a.total_skipped(), 1);
    }
}
