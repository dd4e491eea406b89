//! Filesystem watching
//!
//! Subscribes to change notifications on every configured root and forwards
//! settled paths to [`SyncEngine::sync_path`]. Bursts are coalesced per
//! path through a short debounce window (default 200 ms of quiet,
//! configurable via `[sync] debounce_ms`). A missing directory at startup
//! is tolerated: it is logged and skipped, never fatal.

use crate::error::{Error, Result};
use crate::registry::spec_for;
use crate::sync::SyncEngine;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::sync::Arc;
use std::time::Duration;

/// A running watch subscription. Dropping it (or calling [`Watcher::stop`])
/// ends the subscription; in-flight syncs finish first.
pub struct Watcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl Watcher {
    /// Subscribe to all of the engine's configured roots and forward
    /// settled changes to `sync_path`.
    pub fn spawn(engine: Arc<SyncEngine>) -> Result<Watcher> {
        let debounce = Duration::from_millis(engine.config().sync.debounce_ms);
        let handler_engine = engine.clone();

        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        let path = event.path;
                        // Editors and agents drop temp files everywhere;
                        // only paths that fit a known layout are synced.
                        if handler_engine.classify_path(&path).is_none() {
                            continue;
                        }
                        match handler_engine.sync_path(&path) {
                            Ok(report) => {
                                tracing::info!(
                                    path = %path.display(),
                                    synced = report.total_synced(),
                                    skipped = report.total_skipped(),
                                    errored = report.total_errored(),
                                    "auto-sync"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "auto-sync failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "watch notification error");
                }
            }
        })
        .map_err(|e| Error::Watch(e.to_string()))?;

        let mut watched = 0usize;
        for (kind, dirs) in &engine.config().dirs {
            let spec = spec_for(*kind);
            for dir in dirs {
                let target = match spec.watch_subdir {
                    Some(sub) => dir.join(sub),
                    None => dir.clone(),
                };
                if !target.is_dir() {
                    tracing::warn!(agent = %kind, dir = %target.display(), "watch directory missing, skipping");
                    continue;
                }
                debouncer
                    .watcher()
                    .watch(&target, RecursiveMode::Recursive)
                    .map_err(|e| Error::Watch(format!("{}: {}", target.display(), e)))?;
                watched += 1;
            }
        }
        tracing::info!(roots = watched, debounce_ms = debounce.as_millis() as u64, "watching for changes");

        Ok(Watcher {
            _debouncer: debouncer,
        })
    }

    /// End the subscription.
    pub fn stop(self) {}
}
