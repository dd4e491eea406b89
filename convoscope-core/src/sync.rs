//! Sync engine
//!
//! Drives discovery → classify-by-mtime → parse → persist. One task per
//! file, executed on a bounded worker pool; per-path mutexes guard against
//! concurrent work on the same file (a watcher event racing a full scan).
//! The mtime fingerprint stored alongside the index is the idempotence
//! gate: an unchanged file is never re-parsed.
//!
//! Failure policy: a parse error on one file is logged and reported in the
//! run summary, and the run continues. A store error rolls back that file's
//! transaction and is likewise non-fatal for the run. The store is never
//! left with a partial session.

use crate::config::EngineConfig;
use crate::discovery::matches_layout;
use crate::error::{Error, Result};
use crate::linereader::{read_document, DOC_MAX_LEN};
use crate::parsers::{self, cursor, opencode, ParseContext};
use crate::project::project_from_encoded_dir;
use crate::registry::{agent_by_prefix, spec_for, strip_prefix};
use crate::store::Store;
use crate::types::{
    is_valid_session_id, AgentKind, DiscoveredFile, Fingerprint, SyncReport,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

/// Outcome of processing one file.
#[derive(Debug)]
enum FileOutcome {
    Synced,
    Skipped,
    Errored(String),
}

/// The ingestion engine's control surface.
pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<Store>,
    locks: PathLocks,
    cancel: AtomicBool,
    closed: AtomicBool,
    run_guard: Mutex<()>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, store: Arc<Store>) -> Self {
        Self {
            config,
            store,
            locks: PathLocks::default(),
            cancel: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            run_guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request that an in-flight run stop at its next safe point (the end
    /// of the current file).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Drain in-flight work and refuse further runs.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel();
        let _drained = self.run_guard.lock().unwrap();
    }

    /// Scan every configured directory and process each discovered file.
    pub fn sync_all(&self) -> Result<SyncReport> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Config("engine is closed".to_string()));
        }
        let _run = self.run_guard.lock().unwrap();
        self.cancel.store(false, Ordering::SeqCst);

        if self.config.dirs.iter().all(|(_, dirs)| dirs.is_empty()) {
            return Err(Error::Config(
                "no directories configured for any agent".to_string(),
            ));
        }

        let mut report = SyncReport::default();
        let mut files: Vec<DiscoveredFile> = Vec::new();

        for (kind, dirs) in &self.config.dirs {
            // Touch the stats entry so the report lists every agent in
            // registry order even when nothing was found.
            report.stats_mut(*kind);
            for dir in dirs {
                if !dir.exists() {
                    tracing::warn!(agent = %kind, dir = %dir.display(), "configured directory missing");
                    continue;
                }
                match (spec_for(*kind).discover)(dir) {
                    Ok(found) => {
                        report.stats_mut(*kind).discovered += found.len();
                        files.extend(found);
                    }
                    Err(e) => {
                        tracing::warn!(agent = %kind, dir = %dir.display(), error = %e, "discovery failed");
                        report.errors.push((dir.clone(), e.to_string()));
                    }
                }
            }
        }

        let outcomes = self.process_files(files);
        for (file, outcome) in outcomes {
            self.record_outcome(&mut report, &file, outcome);
        }
        report.cancelled = self.cancel.load(Ordering::SeqCst);
        Ok(report)
    }

    /// Process a single file identified by path; the agent is inferred by
    /// [`SyncEngine::classify_path`]. A change to a database-backed agent's
    /// database re-syncs every session inside it.
    pub fn sync_path(&self, path: &Path) -> Result<SyncReport> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Config("engine is closed".to_string()));
        }
        let _run = self.run_guard.lock().unwrap();

        let Some(agent) = self.classify_path(path) else {
            return Err(Error::UnknownLayout(path.to_path_buf()));
        };

        let mut report = SyncReport::default();
        let files = if spec_for(agent).database_backed {
            let root = self
                .config
                .dirs_for(agent)
                .iter()
                .find(|d| path.starts_with(d))
                .cloned()
                .unwrap_or_else(|| path.parent().unwrap_or(Path::new("/")).to_path_buf());
            (spec_for(agent).discover)(&root)?
        } else {
            vec![DiscoveredFile {
                path: path.to_path_buf(),
                project_hint: self.hint_for(agent, path),
                agent,
            }]
        };
        report.stats_mut(agent).discovered += files.len();

        for file in files {
            let outcome = self.process_file(&file);
            self.record_outcome(&mut report, &file, outcome);
        }
        Ok(report)
    }

    /// Pattern-only inverse of discovery: which agent's layout does this
    /// path belong to? Never opens the file; watchers deliver paths before
    /// content is stable.
    pub fn classify_path(&self, path: &Path) -> Option<AgentKind> {
        for (kind, dirs) in &self.config.dirs {
            for dir in dirs {
                if matches_layout(*kind, dir, path) {
                    return Some(*kind);
                }
            }
        }
        None
    }

    /// Resolve the originating file for a session id, without scanning.
    pub fn find_source(&self, session_id: &str) -> Result<Option<PathBuf>> {
        if !is_valid_session_id(session_id) {
            return Err(Error::InvalidSessionId(session_id.to_string()));
        }
        let Some(kind) = agent_by_prefix(session_id) else {
            return Ok(None);
        };
        let raw = strip_prefix(kind, session_id);
        for dir in self.config.dirs_for(kind) {
            if let Some(path) = (spec_for(kind).find_source)(dir, &raw) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    // ============================================
    // Internals
    // ============================================

    fn record_outcome(&self, report: &mut SyncReport, file: &DiscoveredFile, outcome: FileOutcome) {
        let stats = report.stats_mut(file.agent);
        match outcome {
            FileOutcome::Synced => stats.synced += 1,
            FileOutcome::Skipped => stats.skipped += 1,
            FileOutcome::Errored(msg) => {
                stats.errored += 1;
                tracing::warn!(path = %file.path.display(), error = %msg, "file sync failed");
                report.errors.push((file.path.clone(), msg));
            }
        }
    }

    /// Fan the file list out over the worker pool. Collection preserves no
    /// particular order; the index is deterministic as a set.
    fn process_files(&self, files: Vec<DiscoveredFile>) -> Vec<(DiscoveredFile, FileOutcome)> {
        let workers = self.config.sync.workers().max(1);
        if files.is_empty() {
            return Vec::new();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DiscoveredFile>();
        let (out_tx, out_rx) = crossbeam_channel::unbounded::<(DiscoveredFile, FileOutcome)>();
        for file in files {
            let _ = job_tx.send(file);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    while let Ok(file) = job_rx.recv() {
                        if self.cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        let outcome = self.process_file(&file);
                        if out_tx.send((file, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(out_tx);
            out_rx.iter().collect()
        })
    }

    /// The per-file pipeline: lock, fingerprint-gate, parse, persist.
    fn process_file(&self, file: &DiscoveredFile) -> FileOutcome {
        let entry = self.locks.acquire(&file.path);
        let outcome = {
            let _held = entry.mutex.lock().unwrap();
            self.process_file_locked(file)
        };
        self.locks.release(&file.path, entry);
        outcome
    }

    fn process_file_locked(&self, file: &DiscoveredFile) -> FileOutcome {
        let path_str = file.path.display().to_string();

        let (size, mtime_ns) = match self.current_identity(file) {
            Ok(v) => v,
            Err(e) => return FileOutcome::Errored(e.to_string()),
        };

        let stored = match self.store.get_fingerprint(&path_str) {
            Ok(v) => v,
            Err(e) => return FileOutcome::Errored(e.to_string()),
        };
        if stored.as_ref().is_some_and(|fp| fp.mtime_ns == mtime_ns) {
            return FileOutcome::Skipped;
        }

        let mut fingerprint = Fingerprint {
            path: path_str.clone(),
            size,
            mtime_ns,
            content_hash: None,
        };

        // Cursor transcripts move between paths; identical content already
        // indexed elsewhere is only re-fingerprinted, not re-parsed.
        if file.agent == AgentKind::Cursor {
            match read_document(&file.path, Some(DOC_MAX_LEN)) {
                Ok(bytes) => {
                    let hash = cursor::content_hash(&bytes);
                    let duplicate = self
                        .store
                        .has_content_hash(&hash, &path_str)
                        .unwrap_or(false);
                    fingerprint.content_hash = Some(hash);
                    if duplicate {
                        if let Err(e) = self.store.set_fingerprint(file.agent, &fingerprint) {
                            return FileOutcome::Errored(e.to_string());
                        }
                        return FileOutcome::Skipped;
                    }
                }
                Err(e) => return FileOutcome::Errored(e.to_string()),
            }
        }

        let ctx = ParseContext {
            project_hint: file.project_hint.as_deref(),
            machine: &self.config.machine,
            fork_threshold: self.config.sync.fork_threshold,
        };
        let results = match parsers::parse_file(file.agent, &file.path, &ctx) {
            Ok(r) => r,
            Err(e) => return FileOutcome::Errored(e.to_string()),
        };

        if results.is_empty() {
            if let Err(e) = self.store.set_fingerprint(file.agent, &fingerprint) {
                return FileOutcome::Errored(e.to_string());
            }
            return FileOutcome::Synced;
        }

        match self.store.apply(file.agent, &results, &fingerprint) {
            Ok(outcome) if outcome.rejected.is_empty() => FileOutcome::Synced,
            Ok(outcome) => FileOutcome::Errored(format!(
                "{} session(s) rejected: {}",
                outcome.rejected.len(),
                outcome
                    .rejected
                    .iter()
                    .map(|(id, why)| format!("{} ({})", id, why))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Err(e) => FileOutcome::Errored(e.to_string()),
        }
    }

    /// Size and mtime for the gate. Database-backed agents use the
    /// session's `time_updated` behind the synthetic path.
    fn current_identity(&self, file: &DiscoveredFile) -> Result<(i64, i64)> {
        if spec_for(file.agent).database_backed {
            let mtime_ns = opencode::session_mtime_ns(&file.path)?;
            return Ok((0, mtime_ns));
        }
        let meta = std::fs::metadata(&file.path)?;
        let mtime_ns = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Ok((meta.len() as i64, mtime_ns))
    }

    /// Re-derive the project hint discovery would have attached.
    fn hint_for(&self, agent: AgentKind, path: &Path) -> Option<String> {
        match agent {
            AgentKind::Claude => {
                // <root>/<encoded>/<file> or <root>/<encoded>/<sess>/subagents/<file>
                for dir in self.config.dirs_for(agent) {
                    if let Ok(rel) = path.strip_prefix(dir) {
                        let encoded = rel.components().next()?.as_os_str().to_str()?;
                        return Some(project_from_encoded_dir(encoded, None));
                    }
                }
                None
            }
            AgentKind::Cursor => {
                let encoded = path.parent()?.parent()?.file_name()?.to_str()?;
                Some(project_from_encoded_dir(encoded, None))
            }
            _ => None,
        }
    }
}

// ============================================
// Per-path locks
// ============================================

struct LockEntry {
    mutex: Mutex<()>,
    refs: AtomicUsize,
}

/// Refcounted map of path → mutex. Entries exist only while some task
/// holds or awaits the lock, so the map stays bounded by pool concurrency.
#[derive(Default)]
struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<LockEntry>>>,
}

impl PathLocks {
    fn acquire(&self, path: &Path) -> Arc<LockEntry> {
        let mut map = self.inner.lock().unwrap();
        let entry = map
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                Arc::new(LockEntry {
                    mutex: Mutex::new(()),
                    refs: AtomicUsize::new(0),
                })
            })
            .clone();
        entry.refs.fetch_add(1, Ordering::SeqCst);
        entry
    }

    fn release(&self, path: &Path, entry: Arc<LockEntry>) {
        let mut map = self.inner.lock().unwrap();
        if entry.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            map.remove(path);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
