//! Agent registry
//!
//! A static, ordered table describing every supported agent: where its
//! sessions live by default, which environment variable overrides that,
//! how its session ids are prefixed, and the discovery and source-lookup
//! functions for its on-disk layout.
//!
//! Iteration order over [`REGISTRY`] is deterministic and matches the order
//! in which the sync engine emits per-agent statistics.

use crate::discovery;
use crate::error::Result;
use crate::types::{AgentKind, DiscoveredFile};
use std::path::{Path, PathBuf};

/// One registry row.
pub struct AgentSpec {
    pub kind: AgentKind,
    /// Environment variable overriding the default directory list
    pub env_var: &'static str,
    /// Key under `[agents]` in the config file
    pub config_key: &'static str,
    /// Default directories, relative to the user home
    pub default_dirs: &'static [&'static str],
    /// Subdirectory of the root the watcher should subscribe to, when the
    /// sessions live below the root itself
    pub watch_subdir: Option<&'static str>,
    /// Whether sessions live in a database rather than individual files
    pub database_backed: bool,
    /// Enumerate candidate source files under a root
    pub discover: fn(&Path) -> Result<Vec<DiscoveredFile>>,
    /// Re-derive the source path for a raw (unprefixed) session id without
    /// scanning
    pub find_source: fn(&Path, &str) -> Option<PathBuf>,
}

/// The agent table, in registry order.
pub const REGISTRY: &[AgentSpec] = &[
    AgentSpec {
        kind: AgentKind::Claude,
        env_var: "CLAUDE_PROJECTS_DIR",
        config_key: "claude",
        default_dirs: &[".claude/projects"],
        watch_subdir: None,
        database_backed: false,
        discover: discovery::discover_claude,
        find_source: discovery::find_claude_source,
    },
    AgentSpec {
        kind: AgentKind::Codex,
        env_var: "CODEX_SESSIONS_DIR",
        config_key: "codex",
        default_dirs: &[".codex/sessions"],
        watch_subdir: None,
        database_backed: false,
        discover: discovery::discover_codex,
        find_source: discovery::find_codex_source,
    },
    AgentSpec {
        kind: AgentKind::Copilot,
        env_var: "COPILOT_DIR",
        config_key: "copilot",
        default_dirs: &[".copilot"],
        watch_subdir: Some("session-state"),
        database_backed: false,
        discover: discovery::discover_copilot,
        find_source: discovery::find_copilot_source,
    },
    AgentSpec {
        kind: AgentKind::Gemini,
        env_var: "GEMINI_DIR",
        config_key: "gemini",
        default_dirs: &[".gemini"],
        watch_subdir: Some("tmp"),
        database_backed: false,
        discover: discovery::discover_gemini,
        find_source: discovery::find_gemini_source,
    },
    AgentSpec {
        kind: AgentKind::Opencode,
        env_var: "OPENCODE_DIR",
        config_key: "opencode",
        default_dirs: &[".local/share/opencode"],
        watch_subdir: None,
        database_backed: true,
        discover: discovery::discover_opencode,
        find_source: discovery::find_opencode_source,
    },
    AgentSpec {
        kind: AgentKind::Cursor,
        env_var: "CURSOR_PROJECTS_DIR",
        config_key: "cursor",
        default_dirs: &[".cursor/projects"],
        watch_subdir: None,
        database_backed: false,
        discover: discovery::discover_cursor,
        find_source: discovery::find_cursor_source,
    },
    AgentSpec {
        kind: AgentKind::Amp,
        env_var: "AMP_DIR",
        config_key: "amp",
        default_dirs: &[".local/share/amp/threads"],
        watch_subdir: None,
        database_backed: false,
        discover: discovery::discover_amp,
        find_source: discovery::find_amp_source,
    },
    AgentSpec {
        kind: AgentKind::Pi,
        env_var: "PI_DIR",
        config_key: "pi",
        default_dirs: &[".pi/agent/sessions"],
        watch_subdir: None,
        database_backed: false,
        discover: discovery::discover_pi,
        find_source: discovery::find_pi_source,
    },
];

/// Look up the registry row for an agent.
pub fn spec_for(kind: AgentKind) -> &'static AgentSpec {
    REGISTRY
        .iter()
        .find(|s| s.kind == kind)
        .expect("every AgentKind has a registry row")
}

/// Resolve an agent by its stable short name.
pub fn agent_by_type(name: &str) -> Option<AgentKind> {
    name.parse().ok()
}

/// Resolve the agent owning a session id by prefix.
///
/// Selects the agent whose non-empty prefix the id begins with. Ids with
/// no colon fall back to the prefix-less reference agent; a colon with an
/// unknown prefix resolves to no agent at all.
pub fn agent_by_prefix(session_id: &str) -> Option<AgentKind> {
    for spec in REGISTRY {
        let prefix = spec.kind.id_prefix();
        if prefix.is_empty() {
            continue;
        }
        if session_id
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'))
        {
            return Some(spec.kind);
        }
    }
    if !session_id.contains(':') {
        return Some(AgentKind::Claude);
    }
    None
}

/// Strip the agent prefix from a session id, returning the raw source-level
/// id the agent's own files use.
pub fn strip_prefix(kind: AgentKind, session_id: &str) -> String {
    let prefix = kind.id_prefix();
    if prefix.is_empty() {
        return session_id.to_string();
    }
    session_id
        .strip_prefix(&format!("{}:", prefix))
        .unwrap_or(session_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_agent_once() {
        let kinds: Vec<AgentKind> = REGISTRY.iter().map(|s| s.kind).collect();
        assert_eq!(kinds.len(), 8);
        for (i, kind) in kinds.iter().enumerate() {
            assert!(!kinds[..i].contains(kind));
        }
    }

    #[test]
    fn test_agent_by_type() {
        assert_eq!(agent_by_type("claude"), Some(AgentKind::Claude));
        assert_eq!(agent_by_type("opencode"), Some(AgentKind::Opencode));
        assert_eq!(agent_by_type("mystery"), None);
        assert_eq!(agent_by_type(""), None);
    }

    #[test]
    fn test_agent_by_prefix() {
        assert_eq!(agent_by_prefix("codex:abc-123"), Some(AgentKind::Codex));
        assert_eq!(agent_by_prefix("amp:T-42"), Some(AgentKind::Amp));
        assert_eq!(agent_by_prefix("pi:xyz"), Some(AgentKind::Pi));
        assert_eq!(
            agent_by_prefix("b4749c81-937a-4bd4-b62c-9d78905f0975"),
            Some(AgentKind::Claude)
        );
        assert_eq!(agent_by_prefix("agent-a4767a09"), Some(AgentKind::Claude));
        assert_eq!(agent_by_prefix("mystery:abc"), None);
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix(AgentKind::Codex, "codex:abc"), "abc");
        assert_eq!(strip_prefix(AgentKind::Claude, "abc"), "abc");
        assert_eq!(strip_prefix(AgentKind::Amp, "amp:T-42"), "T-42");
    }

    #[test]
    fn test_only_reference_agent_is_bare() {
        let bare: Vec<_> = REGISTRY
            .iter()
            .filter(|s| s.kind.id_prefix().is_empty())
            .collect();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].kind, AgentKind::Claude);
    }
}
