//! Persistence layer
//!
//! A single embedded SQLite database holding sessions, messages, and tool
//! rows plus a full-text index over message content. All mutation goes
//! through [`Store`]'s transaction API; the engine assumes one writer per
//! index.

pub mod repo;
pub mod schema;

pub use repo::{ApplyOutcome, SearchHit, Store};
