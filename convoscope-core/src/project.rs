//! Project name normalization
//!
//! A project is a short normalized name derived from the working directory
//! a session was started in, or from the hyphen-encoded directory names
//! some agents use to bucket sessions on disk. Hyphens become underscores
//! so names are stable across both derivations.

use std::path::{Path, PathBuf};

/// Normalize a raw project name. Idempotent.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derive a project name from a session's working directory.
///
/// Walks up from `cwd` looking for a git root (a `.git` directory or file,
/// the latter covering worktrees and submodules) and uses its basename;
/// without one, the basename of `cwd` itself. Every path under the same
/// git root maps to the same project.
pub fn project_from_cwd(cwd: &Path) -> String {
    let root = find_git_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    let name = root
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    normalize_name(name)
}

fn find_git_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Derive a project name from a hyphen-encoded directory name
/// (`-home-user-dev-myproject`).
///
/// The encoding replaces path separators with hyphens, which collides with
/// hyphens in real directory names. Resolution order:
///
/// 1. Decode all hyphens to separators and use the real basename when the
///    decoded path exists on disk.
/// 2. Otherwise re-join trailing segments with hyphens, longest tail first,
///    and use the first candidate that exists.
/// 3. Otherwise, when the path no longer resolves, strip a git-worktree
///    suffix using the branch name as a hint.
/// 4. Fall back to the last segment.
pub fn project_from_encoded_dir(encoded: &str, branch_hint: Option<&str>) -> String {
    let Some(stripped) = encoded.strip_prefix('-') else {
        return normalize_name(encoded);
    };

    let segments: Vec<&str> = stripped.split('-').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return normalize_name(encoded);
    }

    // Longest-tail-first: prefer keeping hyphens in the final component.
    for tail_len in (1..=segments.len()).rev() {
        let split = segments.len() - tail_len;
        let mut candidate = PathBuf::from("/");
        for seg in &segments[..split] {
            candidate.push(seg);
        }
        let tail = segments[split..].join("-");
        candidate.push(&tail);
        if candidate.is_dir() {
            return normalize_name(&tail);
        }
    }

    let last = segments[segments.len() - 1];
    if let Some(branch) = branch_hint {
        let joined = segments.join("-");
        if let Some(stripped) = strip_worktree_suffix(&joined, branch) {
            let name = stripped.rsplit('-').next().unwrap_or(stripped);
            return normalize_name(name);
        }
    }
    normalize_name(last)
}

/// Strip a `-<branch>` worktree suffix from a directory name, sanitizing
/// slashes in the branch the way worktree paths encode them. Returns `None`
/// when the name does not end with the branch.
pub fn strip_worktree_suffix<'a>(name: &'a str, branch: &str) -> Option<&'a str> {
    if branch.is_empty() {
        return None;
    }
    let sanitized = branch.replace('/', "-");
    let suffix = format!("-{}", sanitized);
    name.strip_suffix(suffix.as_str()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize_name("my-app (v2)");
        let twice = normalize_name(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "my_app__v2_");
    }

    #[test]
    fn test_project_from_cwd_uses_git_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("my-app");
        std::fs::create_dir_all(root.join(".git")).unwrap();
        let sub = root.join("src").join("deep");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(project_from_cwd(&root), "my_app");
        assert_eq!(project_from_cwd(&sub), project_from_cwd(&root));
    }

    #[test]
    fn test_project_from_cwd_without_git() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("plain");
        std::fs::create_dir_all(&d).unwrap();
        assert_eq!(project_from_cwd(&d), "plain");
    }

    #[test]
    fn test_encoded_dir_unresolvable_takes_last_segment() {
        assert_eq!(
            project_from_encoded_dir("-home-nobody-dev-myproject", None),
            "myproject"
        );
    }

    #[test]
    fn test_encoded_dir_resolves_hyphenated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("my-app");
        std::fs::create_dir_all(&project).unwrap();
        let encoded = project
            .to_string_lossy()
            .trim_start_matches('/')
            .replace('/', "-");
        let encoded = format!("-{}", encoded);
        assert_eq!(project_from_encoded_dir(&encoded, None), "my_app");
    }

    #[test]
    fn test_worktree_suffix_strip() {
        assert_eq!(
            strip_worktree_suffix("myapp-feature-x", "feature-x"),
            Some("myapp")
        );
        assert_eq!(
            strip_worktree_suffix("myapp-feat-login", "feat/login"),
            Some("myapp")
        );
        assert_eq!(strip_worktree_suffix("myapp", "other"), None);
    }

    #[test]
    fn test_encoded_dir_worktree_hint() {
        assert_eq!(
            project_from_encoded_dir("-home-nobody-wt-myapp-feature-x", Some("feature-x")),
            "myapp"
        );
    }
}
