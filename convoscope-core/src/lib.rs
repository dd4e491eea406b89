//! # convoscope-core
//!
//! Ingestion and indexing engine for AI coding assistant session
//! transcripts. Eight agent families, each with its own on-disk layout
//! (line-delimited JSON, single-document JSON threads, SQLite databases,
//! plain-text transcripts), are normalized into one queryable session and
//! message model backed by an embedded SQLite index with full-text search.
//!
//! ## Architecture
//!
//! Data flows bottom-up:
//! - **Discovery** enumerates candidate source files per agent layout.
//! - **Parsers** convert each format into [`ParseResult`]s (a session
//!   header plus its ordered messages), including DAG-aware fork detection
//!   for branching conversation trees.
//! - **Store** persists results transactionally and maintains the
//!   full-text index.
//! - **SyncEngine** orchestrates the pipeline with mtime gating, per-path
//!   locks, and a bounded worker pool; **Watcher** feeds it filesystem
//!   change notifications.
//!
//! ## Example
//!
//! ```rust,no_run
//! use convoscope_core::{ConfigFile, EngineConfig, Store, SyncEngine};
//! use std::sync::Arc;
//!
//! let file = ConfigFile::load().expect("failed to load config");
//! let config = EngineConfig::resolve(&file);
//! let store = Arc::new(Store::open(&ConfigFile::database_path()).expect("open store"));
//! store.migrate().expect("migrate");
//!
//! let engine = SyncEngine::new(config, store);
//! let report = engine.sync_all().expect("sync");
//! println!("synced {} file(s)", report.total_synced());
//! ```

// Re-export commonly used items at the crate root
pub use config::{ConfigFile, EngineConfig, SyncConfig};
pub use error::{Error, Result};
pub use store::{SearchHit, Store};
pub use sync::SyncEngine;
pub use types::*;
pub use watch::Watcher;

// Public modules
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod linereader;
pub mod logging;
pub mod parsers;
pub mod project;
pub mod registry;
pub mod store;
pub mod sync;
pub mod taxonomy;
pub mod timestamp;
pub mod types;
pub mod watch;
