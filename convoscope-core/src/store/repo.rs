//! Store repository
//!
//! Query and mutation operations over the index. The handle serializes all
//! writes through one connection; WAL journaling keeps readers unblocked.
//!
//! The central operation is [`Store::apply`]: everything a parser extracted
//! from one source file lands atomically, session by session. A re-upsert
//! replaces session metadata and *all* of that session's messages in one
//! transaction; partial sessions are never visible.

use crate::error::{Error, Result};
use crate::types::{
    is_valid_session_id, AgentKind, Fingerprint, Message, ParseResult, Role, Session,
    SessionRelationship, ToolCall, ToolResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

/// Result of applying one file's parse results.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Sessions committed
    pub applied: usize,
    /// Sessions rejected (session id, reason); the file's fingerprint is
    /// withheld so the next sync retries it
    pub rejected: Vec<(String, String)>,
}

/// One full-text search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub session_id: String,
    pub ordinal: i64,
}

/// Store handle. Single writer, many readers.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the index database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this store.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Fingerprints
    // ============================================

    /// Stored fingerprint for a source path, if any.
    pub fn get_fingerprint(&self, path: &str) -> Result<Option<Fingerprint>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT path, size_bytes, mtime_ns, content_hash FROM source_files WHERE path = ?1",
            [path],
            |row| {
                Ok(Fingerprint {
                    path: row.get(0)?,
                    size: row.get(1)?,
                    mtime_ns: row.get(2)?,
                    content_hash: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Write a fingerprint outside of an apply (used when a file parsed to
    /// zero sessions).
    pub fn set_fingerprint(&self, agent: AgentKind, fp: &Fingerprint) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        write_fingerprint(&tx, agent, fp)?;
        tx.commit()?;
        Ok(())
    }

    /// True when another indexed path already holds this content hash.
    /// Lets cursor-like transcripts that moved between paths skip
    /// re-indexing.
    pub fn has_content_hash(&self, hash: &str, except_path: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM source_files WHERE content_hash = ?1 AND path != ?2",
            params![hash, except_path],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    // ============================================
    // Apply (the write path)
    // ============================================

    /// Persist one file's parse results.
    ///
    /// Each session commits in its own transaction, in the order the parser
    /// emitted them (main branch first, forks in walk order). A session
    /// whose parent edge would create a cycle is rejected; the others still
    /// land. The file's fingerprint commits with the last session so the
    /// gate and the data move together; it is withheld entirely when any
    /// session was rejected.
    pub fn apply(
        &self,
        agent: AgentKind,
        results: &[ParseResult],
        fingerprint: &Fingerprint,
    ) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        let mut conn = self.conn.lock().unwrap();

        for result in results {
            let tx = conn.transaction()?;
            match apply_result(&tx, result) {
                Ok(()) => {
                    tx.commit()?;
                    outcome.applied += 1;
                }
                Err(Error::SessionCycle(id)) => {
                    drop(tx);
                    tracing::warn!(session = %id, "rejecting session: parent cycle");
                    outcome
                        .rejected
                        .push((id.clone(), "parent cycle".to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        if outcome.rejected.is_empty() {
            let tx = conn.transaction()?;
            write_fingerprint(&tx, agent, fingerprint)?;
            tx.commit()?;
        }
        Ok(outcome)
    }

    // ============================================
    // Reads
    // ============================================

    /// Fetch a session by id. The id is validated before it reaches SQL.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        check_session_id(id)?;
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, project, machine, agent, parent_id, relationship, first_message,
                    started_at, ended_at, message_count, user_message_count, source_file
             FROM sessions WHERE id = ?1",
            [id],
            row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All messages of a session in ordinal order, tool rows included.
    pub fn session_messages(&self, id: &str) -> Result<Vec<Message>> {
        check_session_id(id)?;
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT session_id, ordinal, role, content, ts, has_thinking, has_tool_use,
                    content_length
             FROM messages WHERE session_id = ?1 ORDER BY ordinal",
        )?;
        let mut messages = stmt
            .query_map([id], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut calls: HashMap<i64, Vec<ToolCall>> = HashMap::new();
        let mut call_stmt = conn.prepare(
            "SELECT ordinal, tool_use_id, tool_name, category, input_json, skill_name,
                    subagent_session_id
             FROM tool_calls WHERE session_id = ?1 ORDER BY id",
        )?;
        let call_rows = call_stmt.query_map([id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ToolCall {
                    tool_use_id: row.get(1)?,
                    tool_name: row.get(2)?,
                    category: row
                        .get::<_, String>(3)?
                        .parse()
                        .unwrap_or(crate::taxonomy::ToolCategory::Other),
                    input_json: row.get(4)?,
                    skill_name: row.get(5)?,
                    subagent_session_id: row.get(6)?,
                },
            ))
        })?;
        for row in call_rows {
            let (ordinal, call) = row?;
            calls.entry(ordinal).or_default().push(call);
        }

        let mut results: HashMap<i64, Vec<ToolResult>> = HashMap::new();
        let mut result_stmt = conn.prepare(
            "SELECT ordinal, tool_use_id, content_length
             FROM tool_results WHERE session_id = ?1 ORDER BY id",
        )?;
        let result_rows = result_stmt.query_map([id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ToolResult {
                    tool_use_id: row.get(1)?,
                    content_length: row.get(2)?,
                },
            ))
        })?;
        for row in result_rows {
            let (ordinal, result) = row?;
            results.entry(ordinal).or_default().push(result);
        }

        for msg in messages.iter_mut() {
            if let Some(c) = calls.remove(&msg.ordinal) {
                msg.tool_calls = c;
            }
            if let Some(r) = results.remove(&msg.ordinal) {
                msg.tool_results = r;
            }
        }
        Ok(messages)
    }

    /// Full-text search over message content.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, ordinal FROM messages_fts
             WHERE messages_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![query, limit as i64], |row| {
                Ok(SearchHit {
                    session_id: row.get(0)?,
                    ordinal: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Sessions for a project, most recent first.
    pub fn sessions_for_project(&self, project: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project, machine, agent, parent_id, relationship, first_message,
                    started_at, ended_at, message_count, user_message_count, source_file
             FROM sessions WHERE project = ?1
             ORDER BY started_at DESC, id",
        )?;
        let sessions = stmt
            .query_map([project], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Direct children of a session in the parent graph.
    pub fn child_sessions(&self, id: &str) -> Result<Vec<Session>> {
        check_session_id(id)?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project, machine, agent, parent_id, relationship, first_message,
                    started_at, ended_at, message_count, user_message_count, source_file
             FROM sessions WHERE parent_id = ?1 ORDER BY id",
        )?;
        let sessions = stmt
            .query_map([id], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn session_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .map_err(Error::from)
    }

    pub fn message_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .map_err(Error::from)
    }
}

fn check_session_id(id: &str) -> Result<()> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(Error::InvalidSessionId(id.to_string()))
    }
}

// ============================================
// Write internals
// ============================================

fn apply_result(tx: &Transaction, result: &ParseResult) -> Result<()> {
    let session = &result.session;

    if let Some(parent) = session.parent_id.as_deref() {
        if has_cycle(tx, &session.id, parent)? {
            return Err(Error::SessionCycle(session.id.clone()));
        }
    }

    let relationship = infer_relationship(session);

    tx.execute(
        r#"
        INSERT INTO sessions (id, project, machine, agent, parent_id, relationship,
                              first_message, started_at, ended_at, message_count,
                              user_message_count, source_file)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            project = excluded.project,
            machine = excluded.machine,
            agent = excluded.agent,
            parent_id = excluded.parent_id,
            relationship = excluded.relationship,
            first_message = excluded.first_message,
            started_at = excluded.started_at,
            ended_at = excluded.ended_at,
            message_count = excluded.message_count,
            user_message_count = excluded.user_message_count,
            source_file = excluded.source_file
        "#,
        params![
            session.id,
            session.project,
            session.machine,
            session.agent.as_str(),
            session.parent_id,
            relationship.as_str(),
            session.first_message,
            session.started_at.map(|t| t.to_rfc3339()),
            session.ended_at.map(|t| t.to_rfc3339()),
            session.message_count,
            session.user_message_count,
            session.source_file,
        ],
    )?;

    // Replace, never merge: a re-parse owns the session's message set.
    tx.execute("DELETE FROM messages WHERE session_id = ?1", [&session.id])?;
    tx.execute("DELETE FROM tool_calls WHERE session_id = ?1", [&session.id])?;
    tx.execute("DELETE FROM tool_results WHERE session_id = ?1", [&session.id])?;
    tx.execute("DELETE FROM messages_fts WHERE session_id = ?1", [&session.id])?;

    let mut msg_stmt = tx.prepare(
        "INSERT INTO messages (session_id, ordinal, role, content, ts, has_thinking,
                               has_tool_use, content_length)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut fts_stmt = tx.prepare(
        "INSERT INTO messages_fts (content, session_id, ordinal) VALUES (?1, ?2, ?3)",
    )?;
    let mut call_stmt = tx.prepare(
        "INSERT INTO tool_calls (session_id, ordinal, tool_use_id, tool_name, category,
                                 input_json, skill_name, subagent_session_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut result_stmt = tx.prepare(
        "INSERT INTO tool_results (session_id, ordinal, tool_use_id, content_length)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    for msg in &result.messages {
        msg_stmt.execute(params![
            session.id,
            msg.ordinal,
            msg.role.as_str(),
            msg.content,
            msg.timestamp.map(|t| t.to_rfc3339()),
            msg.has_thinking,
            msg.has_tool_use,
            msg.content_length,
        ])?;
        if !msg.content.is_empty() {
            fts_stmt.execute(params![msg.content, session.id, msg.ordinal])?;
        }
        for call in &msg.tool_calls {
            call_stmt.execute(params![
                session.id,
                msg.ordinal,
                call.tool_use_id,
                call.tool_name,
                call.category.as_str(),
                call.input_json,
                call.skill_name,
                call.subagent_session_id,
            ])?;
        }
        for tool_result in &msg.tool_results {
            result_stmt.execute(params![
                session.id,
                msg.ordinal,
                tool_result.tool_use_id,
                tool_result.content_length,
            ])?;
        }
    }

    Ok(())
}

/// Walk the ancestor chain of `parent`; inserting `id` with that parent
/// must not close a loop. Revisiting any node terminates the walk as a
/// cycle, so a pre-existing loop in the table cannot hang it.
fn has_cycle(tx: &Transaction, id: &str, parent: &str) -> Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(id.to_string());
    let mut current = Some(parent.to_string());
    while let Some(node) = current {
        if !visited.insert(node.clone()) {
            return Ok(true);
        }
        current = tx
            .query_row(
                "SELECT parent_id FROM sessions WHERE id = ?1",
                [&node],
                |r| r.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
    }
    Ok(false)
}

/// Parsers set `fork` explicitly; everything else is inferred at insert.
fn infer_relationship(session: &Session) -> SessionRelationship {
    if session.relationship != SessionRelationship::None {
        return session.relationship;
    }
    if session.parent_id.as_deref().is_some_and(|p| !p.is_empty()) {
        if session.id.starts_with("agent-") {
            SessionRelationship::Subagent
        } else {
            SessionRelationship::Continuation
        }
    } else {
        SessionRelationship::None
    }
}

fn write_fingerprint(tx: &Transaction, agent: AgentKind, fp: &Fingerprint) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO source_files (path, agent, size_bytes, mtime_ns, content_hash)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(path) DO UPDATE SET
            agent = excluded.agent,
            size_bytes = excluded.size_bytes,
            mtime_ns = excluded.mtime_ns,
            content_hash = excluded.content_hash
        "#,
        params![fp.path, agent.as_str(), fp.size, fp.mtime_ns, fp.content_hash],
    )?;
    Ok(())
}

// ============================================
// Row mappers
// ============================================

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project: row.get(1)?,
        machine: row.get(2)?,
        agent: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(AgentKind::Claude),
        parent_id: row.get(4)?,
        relationship: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or(SessionRelationship::None),
        first_message: row.get(6)?,
        started_at: parse_ts(row.get(7)?),
        ended_at: parse_ts(row.get(8)?),
        message_count: row.get(9)?,
        user_message_count: row.get(10)?,
        source_file: row.get(11)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        session_id: row.get(0)?,
        ordinal: row.get(1)?,
        role: row.get::<_, String>(2)?.parse().unwrap_or(Role::User),
        content: row.get(3)?,
        timestamp: parse_ts(row.get(4)?),
        has_thinking: row.get(5)?,
        has_tool_use: row.get(6)?,
        content_length: row.get(7)?,
        tool_calls: vec![],
        tool_results: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::ToolCategory;

    fn store() -> Store {
        let s = Store::open_in_memory().unwrap();
        s.migrate().unwrap();
        s
    }

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            project: "proj".into(),
            machine: "host".into(),
            agent: AgentKind::Claude,
            parent_id: None,
            relationship: SessionRelationship::None,
            first_message: "hello".into(),
            started_at: None,
            ended_at: None,
            message_count: 0,
            user_message_count: 0,
            source_file: "/tmp/f.jsonl".into(),
        }
    }

    fn message(ordinal: i64, role: Role, content: &str) -> Message {
        Message {
            session_id: String::new(),
            ordinal,
            role,
            content: content.to_string(),
            timestamp: None,
            has_thinking: false,
            has_tool_use: false,
            content_length: content.len() as i64,
            tool_calls: vec![],
            tool_results: vec![],
        }
    }

    fn fingerprint(path: &str) -> Fingerprint {
        Fingerprint {
            path: path.to_string(),
            size: 100,
            mtime_ns: 42,
            content_hash: None,
        }
    }

    fn apply_one(store: &Store, s: Session, messages: Vec<Message>) -> ApplyOutcome {
        let mut msgs = messages;
        for (i, m) in msgs.iter_mut().enumerate() {
            m.session_id = s.id.clone();
            m.ordinal = i as i64;
        }
        let mut sess = s;
        sess.message_count = msgs.len() as i64;
        let fp = fingerprint(&sess.source_file.clone());
        store
            .apply(
                sess.agent,
                &[ParseResult {
                    session: sess,
                    messages: msgs,
                }],
                &fp,
            )
            .unwrap()
    }

    #[test]
    fn test_apply_and_read_back() {
        let s = store();
        let outcome = apply_one(
            &s,
            session("s1"),
            vec![
                message(0, Role::User, "find the bug"),
                message(1, Role::Assistant, "looking"),
            ],
        );
        assert_eq!(outcome.applied, 1);

        let loaded = s.get_session("s1").unwrap().unwrap();
        assert_eq!(loaded.project, "proj");
        assert_eq!(loaded.message_count, 2);

        let messages = s.session_messages("s1").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "find the bug");
        let ordinals: Vec<i64> = messages.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
    }

    #[test]
    fn test_reupsert_replaces_messages_atomically() {
        let s = store();
        apply_one(
            &s,
            session("s1"),
            vec![
                message(0, Role::User, "old first"),
                message(1, Role::Assistant, "old second"),
                message(2, Role::User, "old third"),
            ],
        );
        apply_one(
            &s,
            session("s1"),
            vec![message(0, Role::User, "new only")],
        );

        assert_eq!(s.session_count().unwrap(), 1);
        let messages = s.session_messages("s1").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "new only");
        // FTS replaced in the same transaction
        assert!(s.search("old", 10).unwrap().is_empty());
        assert_eq!(s.search("new", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_rejected_others_proceed() {
        let s = store();
        let mut a = session("sess-a");
        a.parent_id = Some("sess-b".into());
        apply_one(&s, a, vec![message(0, Role::User, "a")]);

        let mut b = session("sess-b");
        b.parent_id = Some("sess-a".into());
        let mut c = session("sess-c");
        c.parent_id = Some("sess-a".into());

        let fp = fingerprint("/tmp/multi.jsonl");
        let outcome = s
            .apply(
                AgentKind::Claude,
                &[
                    ParseResult {
                        session: b,
                        messages: vec![],
                    },
                    ParseResult {
                        session: c,
                        messages: vec![],
                    },
                ],
                &fp,
            )
            .unwrap();

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, "sess-b");
        assert!(s.get_session("sess-b").unwrap().is_none());
        assert!(s.get_session("sess-c").unwrap().is_some());
        // Fingerprint withheld so the file retries
        assert!(s.get_fingerprint("/tmp/multi.jsonl").unwrap().is_none());
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let s = store();
        let mut a = session("sess-a");
        a.parent_id = Some("sess-a".into());
        let fp = fingerprint("/tmp/x.jsonl");
        let outcome = s
            .apply(
                AgentKind::Claude,
                &[ParseResult {
                    session: a,
                    messages: vec![],
                }],
                &fp,
            )
            .unwrap();
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn test_relationship_inference() {
        let s = store();
        let mut agent = session("agent-a4767a09");
        agent.parent_id = Some("parent-sess".into());
        apply_one(&s, agent, vec![]);
        assert_eq!(
            s.get_session("agent-a4767a09").unwrap().unwrap().relationship,
            SessionRelationship::Subagent
        );

        let mut cont = session("resumed");
        cont.parent_id = Some("parent-sess".into());
        apply_one(&s, cont, vec![]);
        assert_eq!(
            s.get_session("resumed").unwrap().unwrap().relationship,
            SessionRelationship::Continuation
        );

        let mut fork = session("parent-sess-v0");
        fork.parent_id = Some("parent-sess".into());
        fork.relationship = SessionRelationship::Fork;
        apply_one(&s, fork, vec![]);
        assert_eq!(
            s.get_session("parent-sess-v0").unwrap().unwrap().relationship,
            SessionRelationship::Fork
        );
    }

    #[test]
    fn test_tool_rows_round_trip() {
        let s = store();
        let mut msg = message(0, Role::Assistant, "[Bash: build]\n$ make");
        msg.has_tool_use = true;
        msg.tool_calls.push(ToolCall {
            tool_use_id: Some("tu1".into()),
            tool_name: "Bash".into(),
            category: ToolCategory::Bash,
            input_json: r#"{"command":"make"}"#.into(),
            skill_name: None,
            subagent_session_id: None,
        });
        let mut carrier = message(1, Role::User, "");
        carrier.tool_results.push(ToolResult {
            tool_use_id: "tu1".into(),
            content_length: 512,
        });
        apply_one(&s, session("s1"), vec![msg, carrier]);

        let messages = s.session_messages("s1").unwrap();
        assert_eq!(messages[0].tool_calls.len(), 1);
        assert_eq!(messages[0].tool_calls[0].category, ToolCategory::Bash);
        assert_eq!(messages[1].tool_results.len(), 1);
        assert_eq!(messages[1].tool_results[0].content_length, 512);
    }

    #[test]
    fn test_fingerprint_round_trip() {
        let s = store();
        let fp = Fingerprint {
            path: "/tmp/a.jsonl".into(),
            size: 10,
            mtime_ns: 999,
            content_hash: Some("abc".into()),
        };
        s.set_fingerprint(AgentKind::Cursor, &fp).unwrap();
        assert_eq!(s.get_fingerprint("/tmp/a.jsonl").unwrap(), Some(fp));
        assert!(s.has_content_hash("abc", "/other").unwrap());
        assert!(!s.has_content_hash("abc", "/tmp/a.jsonl").unwrap());
    }

    #[test]
    fn test_invalid_id_rejected_at_boundary() {
        let s = store();
        assert!(matches!(
            s.get_session("../etc/passwd"),
            Err(Error::InvalidSessionId(_))
        ));
        assert!(matches!(
            s.session_messages("a b"),
            Err(Error::InvalidSessionId(_))
        ));
    }

    #[test]
    fn test_search_finds_sessions() {
        let s = store();
        apply_one(
            &s,
            session("s1"),
            vec![message(0, Role::User, "the websocket handshake fails")],
        );
        apply_one(
            &s,
            session("s2"),
            vec![message(0, Role::User, "style the button")],
        );
        let hits = s.search("websocket", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[test]
    fn test_children_listing() {
        let s = store();
        apply_one(&s, session("root"), vec![]);
        let mut kid = session("kid");
        kid.parent_id = Some("root".into());
        apply_one(&s, kid, vec![]);
        let children = s.child_sessions("root").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "kid");
    }
}
