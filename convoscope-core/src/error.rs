//! Error types for convoscope-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the convoscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for agent transcripts
    #[error("parse error in {agent} transcript: {message}")]
    Parse { agent: String, message: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A session id failed validation at a lookup boundary
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Inserting a session would create a cycle in the parent graph
    #[error("session parent cycle detected at {0}")]
    SessionCycle(String),

    /// No parser or layout matched the given path
    #[error("no agent layout matches path: {0}")]
    UnknownLayout(PathBuf),

    /// Watcher error
    #[error("watch error: {0}")]
    Watch(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for convoscope-core
pub type Result<T> = std::result::Result<T, Error>;
