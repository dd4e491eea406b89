//! Source discovery
//!
//! One walker per agent layout. Discovery is purely listing: it yields a
//! sorted, deduplicated set of candidate files with pre-extracted project
//! hints and never parses content, except where a layout is ambiguous by
//! construction and demands a bounded sniff (pi header validation).
//!
//! A missing root is not an error here; the sync engine decides how loudly
//! to complain about unreadable configuration.
//!
//! Each agent also has a `find_*_source` inverse: re-derive the expected
//! path for a raw session id and stat it, without a full scan. Used when an
//! external caller holds an id and needs the originating file.

use crate::error::Result;
use crate::linereader::LineReader;
use crate::project::project_from_encoded_dir;
use crate::types::{AgentKind, DiscoveredFile};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn rollout_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^rollout-.*-([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\.jsonl$",
        )
        .expect("static regex compiles")
    })
}

/// Extract the session UUID from a codex rollout filename.
pub fn rollout_uuid(file_name: &str) -> Option<String> {
    rollout_re()
        .captures(file_name)
        .map(|c| c[1].to_ascii_lowercase())
}

fn sort_dedup(files: &mut Vec<DiscoveredFile>) {
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
}

/// Sorted directory entries under `dir`; empty when the directory is
/// missing or unreadable.
fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<PathBuf> = rd.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    out.sort();
    out
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

// ============================================
// Claude: two-level project dirs + nested subagents
// ============================================

/// `<root>/<encoded-project>/<session>.jsonl` plus
/// `<root>/<encoded-project>/<session>/subagents/agent-*.jsonl`.
pub fn discover_claude(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for project_dir in sorted_entries(root) {
        if !project_dir.is_dir() {
            continue;
        }
        let hint = project_from_encoded_dir(file_name(&project_dir), None);
        for entry in sorted_entries(&project_dir) {
            if entry.is_file() && has_ext(&entry, "jsonl") {
                files.push(DiscoveredFile {
                    path: entry,
                    project_hint: Some(hint.clone()),
                    agent: AgentKind::Claude,
                });
            } else if entry.is_dir() {
                let subagents = entry.join("subagents");
                for sub in sorted_entries(&subagents) {
                    if sub.is_file()
                        && has_ext(&sub, "jsonl")
                        && file_name(&sub).starts_with("agent-")
                    {
                        files.push(DiscoveredFile {
                            path: sub,
                            project_hint: Some(hint.clone()),
                            agent: AgentKind::Claude,
                        });
                    }
                }
            }
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_claude_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    for project_dir in sorted_entries(root) {
        if !project_dir.is_dir() {
            continue;
        }
        let candidate = project_dir.join(format!("{}.jsonl", raw_id));
        if candidate.is_file() {
            return Some(candidate);
        }
        if raw_id.starts_with("agent-") {
            // Subagent files sit one level deeper, under their parent
            // session's directory.
            for session_dir in sorted_entries(&project_dir) {
                let candidate = session_dir
                    .join("subagents")
                    .join(format!("{}.jsonl", raw_id));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

// ============================================
// Codex: year/month/day tree
// ============================================

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// `<root>/<yyyy>/<mm>/<dd>/rollout-*-<uuid>.jsonl`.
pub fn discover_codex(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for year in sorted_entries(root) {
        if !year.is_dir() || !all_digits(file_name(&year), 4) {
            continue;
        }
        for month in sorted_entries(&year) {
            if !month.is_dir() || !all_digits(file_name(&month), 2) {
                continue;
            }
            for day in sorted_entries(&month) {
                if !day.is_dir() || !all_digits(file_name(&day), 2) {
                    continue;
                }
                for entry in sorted_entries(&day) {
                    if entry.is_file() && rollout_uuid(file_name(&entry)).is_some() {
                        files.push(DiscoveredFile {
                            path: entry,
                            project_hint: None,
                            agent: AgentKind::Codex,
                        });
                    }
                }
            }
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_codex_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    // The date prefix is not recoverable from the id; a bounded glob over
    // the three date levels stands in for a path derivation.
    let pattern = root.join(format!("*/*/*/rollout-*-{}.jsonl", raw_id));
    glob::glob(pattern.to_str()?)
        .ok()?
        .flatten()
        .find(|p| p.is_file())
}

// ============================================
// Copilot: bare file or per-session directory
// ============================================

/// `<root>/session-state/<uuid>.jsonl` or
/// `<root>/session-state/<uuid>/events.jsonl`; the directory form wins when
/// both exist for the same id.
pub fn discover_copilot(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let state = root.join("session-state");
    let mut by_id: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in sorted_entries(&state) {
        if entry.is_file() && has_ext(&entry, "jsonl") {
            let id = entry
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            by_id.entry(id).or_insert(entry);
        } else if entry.is_dir() {
            let events = entry.join("events.jsonl");
            if events.is_file() {
                let id = file_name(&entry).to_string();
                by_id.insert(id, events);
            }
        }
    }
    let mut files: Vec<DiscoveredFile> = by_id
        .into_values()
        .map(|path| DiscoveredFile {
            path,
            project_hint: None,
            agent: AgentKind::Copilot,
        })
        .collect();
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_copilot_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    let state = root.join("session-state");
    let dir_form = state.join(raw_id).join("events.jsonl");
    if dir_form.is_file() {
        return Some(dir_form);
    }
    let bare = state.join(format!("{}.jsonl", raw_id));
    bare.is_file().then_some(bare)
}

// ============================================
// Gemini: hashed project dirs with companion maps
// ============================================

/// `<root>/tmp/<hash>/chats/session-*.json`, where `<hash>` is the SHA-256
/// of the absolute project path. `projects.json` and `trustedFolders.json`
/// supply the hash-to-project mapping; when both list the same path, the
/// first in sorted path order wins.
pub fn discover_gemini(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let hash_to_project = gemini_project_map(root);
    let mut files = Vec::new();
    let tmp = root.join("tmp");
    for hash_dir in sorted_entries(&tmp) {
        if !hash_dir.is_dir() {
            continue;
        }
        let hint = hash_to_project.get(file_name(&hash_dir)).cloned();
        let chats = hash_dir.join("chats");
        for entry in sorted_entries(&chats) {
            if entry.is_file()
                && has_ext(&entry, "json")
                && file_name(&entry).starts_with("session-")
            {
                files.push(DiscoveredFile {
                    path: entry,
                    project_hint: hint.clone(),
                    agent: AgentKind::Gemini,
                });
            }
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

/// Best-effort read of the companion config files, once per discovery pass.
fn gemini_project_map(root: &Path) -> BTreeMap<String, String> {
    let mut paths: Vec<String> = Vec::new();
    for name in ["projects.json", "trustedFolders.json"] {
        let Ok(bytes) = std::fs::read(root.join(name)) else {
            continue;
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            continue;
        };
        match value {
            serde_json::Value::Object(map) => {
                paths.extend(map.keys().filter(|k| k.starts_with('/')).cloned());
            }
            serde_json::Value::Array(items) => {
                paths.extend(
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .filter(|s| s.starts_with('/'))
                        .map(str::to_string),
                );
            }
            _ => {}
        }
    }
    paths.sort();
    paths.dedup();

    let mut map = BTreeMap::new();
    for path in paths {
        let digest = hex::encode(Sha256::digest(path.as_bytes()));
        let name = crate::project::project_from_cwd(Path::new(&path));
        // First path in sorted order wins for a shared hash.
        map.entry(digest).or_insert(name);
    }
    map
}

pub fn find_gemini_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    let pattern = root.join(format!("tmp/*/chats/session-{}.json", raw_id));
    if let Some(hit) = glob::glob(pattern.to_str()?).ok()?.flatten().next() {
        return Some(hit);
    }
    // Chat files embed the id in the document rather than the name for some
    // versions; fall back to a name-contains match.
    let pattern = root.join(format!("tmp/*/chats/session-*{}*.json", raw_id));
    glob::glob(pattern.to_str()?)
        .ok()?
        .flatten()
        .find(|p| p.is_file())
}

// ============================================
// Amp: flat thread files
// ============================================

/// `<root>/T-*.json`.
pub fn discover_amp(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for entry in sorted_entries(root) {
        if entry.is_file() && has_ext(&entry, "json") && file_name(&entry).starts_with("T-") {
            files.push(DiscoveredFile {
                path: entry,
                project_hint: None,
                agent: AgentKind::Amp,
            });
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_amp_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    let candidate = root.join(format!("{}.json", raw_id));
    candidate.is_file().then_some(candidate)
}

// ============================================
// Pi: content-validated two-level dirs
// ============================================

/// `<root>/<encoded-cwd>/<session>.jsonl`. The directory encoding is
/// ambiguous between pi versions, so discovery verifies that each file's
/// first non-blank JSON line has `type == "session"` before yielding it.
/// The project hint stays unset; the parser reads it from the header `cwd`.
pub fn discover_pi(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    for dir in sorted_entries(root) {
        if !dir.is_dir() {
            continue;
        }
        for entry in sorted_entries(&dir) {
            if entry.is_file() && has_ext(&entry, "jsonl") && pi_header_valid(&entry) {
                files.push(DiscoveredFile {
                    path: entry,
                    project_hint: None,
                    agent: AgentKind::Pi,
                });
            }
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

fn pi_header_valid(path: &Path) -> bool {
    let Ok(mut reader) = LineReader::open(path) else {
        return false;
    };
    let Some(line) = reader.next_line() else {
        return false;
    };
    serde_json::from_str::<serde_json::Value>(&line)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "session"))
        .unwrap_or(false)
}

pub fn find_pi_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    let pattern = root.join(format!("*/{}.jsonl", raw_id));
    glob::glob(pattern.to_str()?)
        .ok()?
        .flatten()
        .find(|p| p.is_file())
}

// ============================================
// Cursor: canonicalized project dirs with symlink containment
// ============================================

/// `<root>/<encoded-project>/agent-transcripts/<id>.{txt,jsonl}`. The real
/// path of each transcripts directory must stay inside the real path of the
/// root; an escaping project is skipped, the rest are still returned. When
/// both extensions exist for one stem, `.jsonl` wins.
pub fn discover_cursor(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let Ok(canonical_root) = root.canonicalize() else {
        return Ok(Vec::new());
    };
    let mut files = Vec::new();
    for project_dir in sorted_entries(root) {
        if !project_dir.is_dir() {
            continue;
        }
        let transcripts = project_dir.join("agent-transcripts");
        if !transcripts.is_dir() {
            continue;
        }
        let Ok(real) = transcripts.canonicalize() else {
            continue;
        };
        if !real.starts_with(&canonical_root) {
            tracing::warn!(
                path = %transcripts.display(),
                "transcripts directory escapes root, skipping project"
            );
            continue;
        }
        let hint = project_from_encoded_dir(file_name(&project_dir), None);
        let mut by_stem: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in sorted_entries(&transcripts) {
            if !entry.is_file() {
                continue;
            }
            let Some(stem) = entry.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if has_ext(&entry, "jsonl") {
                by_stem.insert(stem.to_string(), entry);
            } else if has_ext(&entry, "txt") {
                by_stem.entry(stem.to_string()).or_insert(entry);
            }
        }
        for path in by_stem.into_values() {
            files.push(DiscoveredFile {
                path,
                project_hint: Some(hint.clone()),
                agent: AgentKind::Cursor,
            });
        }
    }
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_cursor_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    for ext in ["jsonl", "txt"] {
        let pattern = root.join(format!("*/agent-transcripts/{}.{}", raw_id, ext));
        if let Some(hit) = glob::glob(pattern.to_str()?).ok()?.flatten().find(|p| p.is_file()) {
            return Some(hit);
        }
    }
    None
}

// ============================================
// Opencode: database-backed
// ============================================

/// Locate the opencode database under a root.
pub fn opencode_db_path(root: &Path) -> Option<PathBuf> {
    let primary = root.join("opencode.db");
    if primary.is_file() {
        return Some(primary);
    }
    sorted_entries(root)
        .into_iter()
        .find(|p| p.is_file() && has_ext(p, "db"))
}

/// Enumerate sessions straight from the `session` table, read-only. Paths
/// are synthetic: `<db-path>#<session-id>`.
pub fn discover_opencode(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let Some(db_path) = opencode_db_path(root) else {
        return Ok(Vec::new());
    };
    let conn = open_opencode_db(&db_path)?;
    let mut stmt = conn.prepare("SELECT id FROM session ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut files: Vec<DiscoveredFile> = ids
        .into_iter()
        .map(|id| DiscoveredFile {
            path: synthetic_db_path(&db_path, &id),
            project_hint: None,
            agent: AgentKind::Opencode,
        })
        .collect();
    sort_dedup(&mut files);
    Ok(files)
}

pub fn find_opencode_source(root: &Path, raw_id: &str) -> Option<PathBuf> {
    let db_path = opencode_db_path(root)?;
    let conn = open_opencode_db(&db_path).ok()?;
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM session WHERE id = ?1)",
            [raw_id],
            |row| row.get(0),
        )
        .ok()?;
    exists.then(|| synthetic_db_path(&db_path, raw_id))
}

/// Build the synthetic `<db-path>#<id>` path for a database-backed session.
pub fn synthetic_db_path(db_path: &Path, id: &str) -> PathBuf {
    PathBuf::from(format!("{}#{}", db_path.display(), id))
}

/// Split a synthetic path back into `(db_path, session_id)`.
pub fn split_synthetic_db_path(path: &Path) -> Option<(PathBuf, String)> {
    let s = path.to_str()?;
    let (db, id) = s.rsplit_once('#')?;
    Some((PathBuf::from(db), id.to_string()))
}

/// Open an opencode database read-only with a short busy timeout.
pub fn open_opencode_db(db_path: &Path) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

// ============================================
// Layout matching (classification support)
// ============================================

/// Pattern-only test of whether `path` fits `agent`'s layout under `root`.
/// Never opens the file: watchers deliver paths before content is stable.
pub fn matches_layout(agent: AgentKind, root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let comps: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    let ends = |name: &str, suffix: &str| name.ends_with(suffix);

    match agent {
        AgentKind::Claude => match comps.as_slice() {
            [_, file] => ends(file, ".jsonl"),
            [_, _, sub, file] => {
                *sub == "subagents" && file.starts_with("agent-") && ends(file, ".jsonl")
            }
            _ => false,
        },
        AgentKind::Codex => match comps.as_slice() {
            [y, m, d, file] => {
                all_digits(y, 4) && all_digits(m, 2) && all_digits(d, 2) && rollout_uuid(file).is_some()
            }
            _ => false,
        },
        AgentKind::Copilot => match comps.as_slice() {
            ["session-state", file] => ends(file, ".jsonl"),
            ["session-state", _, file] => *file == "events.jsonl",
            _ => false,
        },
        AgentKind::Gemini => match comps.as_slice() {
            ["tmp", _, "chats", file] => file.starts_with("session-") && ends(file, ".json"),
            _ => false,
        },
        AgentKind::Opencode => match comps.as_slice() {
            [file] => ends(file, ".db") || file.contains(".db#"),
            _ => false,
        },
        AgentKind::Cursor => match comps.as_slice() {
            [_, "agent-transcripts", file] => ends(file, ".txt") || ends(file, ".jsonl"),
            _ => false,
        },
        AgentKind::Amp => match comps.as_slice() {
            [file] => file.starts_with("T-") && ends(file, ".json"),
            _ => false,
        },
        AgentKind::Pi => match comps.as_slice() {
            [_, file] => ends(file, ".jsonl"),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rollout_uuid() {
        assert_eq!(
            rollout_uuid("rollout-2025-01-12T10-00-00-1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d.jsonl"),
            Some("1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d".to_string())
        );
        assert_eq!(rollout_uuid("rollout-notauuid.jsonl"), None);
        assert_eq!(rollout_uuid("other.jsonl"), None);
    }

    #[test]
    fn test_discover_claude_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let proj = root.join("-home-u-dev-myapp");
        fs::create_dir_all(&proj).unwrap();
        fs::write(proj.join("s1.jsonl"), "{}\n").unwrap();
        let sub = proj.join("s1").join("subagents");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("agent-abc.jsonl"), "{}\n").unwrap();
        fs::write(sub.join("notes.txt"), "x").unwrap();

        let files = discover_claude(root).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.agent == AgentKind::Claude));
        assert!(files.iter().all(|f| f.project_hint.as_deref() == Some("myapp")));
        for f in &files {
            assert!(matches_layout(AgentKind::Claude, root, &f.path));
        }
    }

    #[test]
    fn test_discover_codex_skips_non_date_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let day = root.join("2025").join("01").join("12");
        fs::create_dir_all(&day).unwrap();
        let name = "rollout-2025-01-12T10-00-00-1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d.jsonl";
        fs::write(day.join(name), "{}\n").unwrap();
        fs::create_dir_all(root.join("archive").join("01").join("12")).unwrap();

        let files = discover_codex(root).unwrap();
        assert_eq!(files.len(), 1);
        assert!(matches_layout(AgentKind::Codex, root, &files[0].path));
        assert_eq!(
            find_codex_source(root, "1f2e3d4c-0001-4a2b-9c3d-5e6f7a8b9c0d"),
            Some(files[0].path.clone())
        );
    }

    #[test]
    fn test_discover_copilot_directory_form_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let state = root.join("session-state");
        fs::create_dir_all(state.join("abc-1")).unwrap();
        fs::write(state.join("abc-1.jsonl"), "{}\n").unwrap();
        fs::write(state.join("abc-1").join("events.jsonl"), "{}\n").unwrap();
        fs::write(state.join("def-2.jsonl"), "{}\n").unwrap();

        let files = discover_copilot(root).unwrap();
        assert_eq!(files.len(), 2);
        let abc = files
            .iter()
            .find(|f| f.path.to_string_lossy().contains("abc-1"))
            .unwrap();
        assert!(abc.path.ends_with("abc-1/events.jsonl"));
        assert_eq!(
            find_copilot_source(root, "abc-1").unwrap(),
            state.join("abc-1").join("events.jsonl")
        );
        assert_eq!(
            find_copilot_source(root, "def-2").unwrap(),
            state.join("def-2.jsonl")
        );
    }

    #[test]
    fn test_discover_pi_validates_header() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let enc = root.join("--home--u--dev--app");
        fs::create_dir_all(&enc).unwrap();
        fs::write(
            enc.join("good.jsonl"),
            "{\"type\":\"session\",\"id\":\"good\"}\n",
        )
        .unwrap();
        fs::write(enc.join("bad.jsonl"), "{\"type\":\"message\"}\n").unwrap();
        fs::write(enc.join("junk.jsonl"), "not json\n").unwrap();

        let files = discover_pi(root).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("good.jsonl"));
        assert!(files[0].project_hint.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_cursor_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("x.txt"), "user: hi\n").unwrap();

        // Honest project
        let good = root.join("proj-ok").join("agent-transcripts");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("t1.txt"), "user: hi\n").unwrap();
        fs::write(good.join("t1.jsonl"), "{}\n").unwrap();

        // Project whose transcripts dir escapes the root
        let evil = root.join("proj-evil");
        fs::create_dir_all(&evil).unwrap();
        std::os::unix::fs::symlink(&outside, evil.join("agent-transcripts")).unwrap();

        let files = discover_cursor(&root).unwrap();
        assert_eq!(files.len(), 1);
        // .jsonl wins over .txt for the same stem
        assert!(files[0].path.ends_with("t1.jsonl"));
    }

    #[test]
    fn test_discover_missing_roots_are_empty() {
        let missing = Path::new("/nonexistent/convoscope-test");
        assert!(discover_claude(missing).unwrap().is_empty());
        assert!(discover_codex(missing).unwrap().is_empty());
        assert!(discover_amp(missing).unwrap().is_empty());
        assert!(discover_opencode(missing).unwrap().is_empty());
    }

    #[test]
    fn test_gemini_hash_map_and_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let project_path = "/home/u/dev/webapp";
        fs::write(
            root.join("projects.json"),
            format!("{{\"{}\": {{}}}}", project_path),
        )
        .unwrap();
        let digest = hex::encode(Sha256::digest(project_path.as_bytes()));
        let chats = root.join("tmp").join(&digest).join("chats");
        fs::create_dir_all(&chats).unwrap();
        fs::write(chats.join("session-1.json"), "{}").unwrap();
        fs::write(chats.join("notes.txt"), "x").unwrap();

        let files = discover_gemini(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].project_hint.as_deref(), Some("webapp"));
        assert!(matches_layout(AgentKind::Gemini, root, &files[0].path));
    }

    #[test]
    fn test_synthetic_db_path_round_trip() {
        let db = PathBuf::from("/data/opencode.db");
        let synthetic = synthetic_db_path(&db, "ses_01");
        let (back_db, id) = split_synthetic_db_path(&synthetic).unwrap();
        assert_eq!(back_db, db);
        assert_eq!(id, "ses_01");
    }

    #[test]
    fn test_amp_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("T-123.json"), "{}").unwrap();
        fs::write(root.join("other.json"), "{}").unwrap();
        let files = discover_amp(root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(find_amp_source(root, "T-123"), Some(root.join("T-123.json")));
        assert!(matches_layout(AgentKind::Amp, root, &files[0].path));
    }
}
