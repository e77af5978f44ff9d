// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message queries and full-text search.

use murmur_core::MurmurError;
use murmur_core::types::{MemorySnippet, Message, SnippetKind};
use rusqlite::{OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::queries::{is_constraint_violation, parse_column, placeholders};

const MESSAGE_COLUMNS: &str = "id, user_id, session_id, role, content, created_at, \
     importance_score, consolidated_at, consolidated_summary_id";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        role: parse_column(row, 3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        importance_score: row.get(6)?,
        consolidated_at: row.get(7)?,
        consolidated_summary_id: row.get(8)?,
    })
}

fn row_to_snippet(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemorySnippet> {
    Ok(MemorySnippet {
        id: row.get(0)?,
        kind: parse_column(row, 1)?,
        content: row.get(2)?,
        session_id: row.get(3)?,
        created_at: row.get(4)?,
        score: row.get(5)?,
    })
}

/// Insert a message and bump its session's `message_count` and
/// `last_activity_at` in one transaction.
///
/// An idle session is moved back to active, since its user is still
/// talking into it. Idempotent on the message id: appending a message that
/// is already stored for the same session succeeds without counting it
/// twice. Fails with `NotFound` if the session does not exist or is closed,
/// and with `Validation` if the id belongs to another session or the idle
/// session's user has since started a newer active one.
pub async fn append_message(db: &Database, message: &Message) -> Result<(), MurmurError> {
    let message = message.clone();
    let (message_id, session_id) = (message.id.clone(), message.session_id.clone());
    let outcome = db
        .connection()
        .call(move |conn| -> Result<AppendOutcome, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let open: Option<String> = tx
                .query_row(
                    "SELECT state FROM sessions WHERE id = ?1 AND state != 'closed'",
                    params![message.session_id],
                    |row| row.get(0),
                )
                .optional()?;
            match open.as_deref() {
                None => return Ok(AppendOutcome::NoOpenSession),
                Some("idle") => {
                    let resumed = tx.execute(
                        "UPDATE sessions SET state = 'active', idled_at = NULL WHERE id = ?1",
                        params![message.session_id],
                    );
                    match resumed {
                        Ok(_) => {}
                        Err(e) if is_constraint_violation(&e) => {
                            return Ok(AppendOutcome::Superseded);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(_) => {}
            }
            let inserted = tx.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(id) DO NOTHING"
                ),
                params![
                    message.id,
                    message.user_id,
                    message.session_id,
                    message.role.to_string(),
                    message.content,
                    message.created_at,
                    message.importance_score,
                    message.consolidated_at,
                    message.consolidated_summary_id,
                ],
            )?;
            if inserted == 0 {
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT session_id FROM messages WHERE id = ?1",
                        params![message.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Ok(match owner {
                    Some(owner) if owner == message.session_id => AppendOutcome::AlreadyStored,
                    _ => AppendOutcome::IdConflict,
                });
            }
            tx.execute(
                "UPDATE sessions
                 SET message_count = message_count + 1,
                     last_activity_at = MAX(last_activity_at, ?2)
                 WHERE id = ?1",
                params![message.session_id, message.created_at],
            )?;
            tx.commit()?;
            Ok(AppendOutcome::Inserted)
        })
        .await
        .map_err(map_tr_err)?;

    match outcome {
        AppendOutcome::Inserted | AppendOutcome::AlreadyStored => Ok(()),
        AppendOutcome::NoOpenSession => Err(MurmurError::not_found("open session", session_id)),
        AppendOutcome::IdConflict => Err(MurmurError::Validation(format!(
            "message id {message_id} belongs to another session"
        ))),
        AppendOutcome::Superseded => Err(MurmurError::Validation(format!(
            "session {session_id} is idle and its user has a newer active session"
        ))),
    }
}

enum AppendOutcome {
    Inserted,
    AlreadyStored,
    NoOpenSession,
    IdConflict,
    Superseded,
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, MurmurError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The last `limit` messages of a session, returned oldest first.
///
/// `rowid` breaks timestamp ties so arrival order is preserved.
pub async fn recent_messages(
    db: &Database,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Message>, MurmurError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT {MESSAGE_COLUMNS}, rowid AS seq FROM messages
                     WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2
                 ) ORDER BY created_at ASC, seq ASC"
            ))?;
            let messages = stmt
                .query_map(params![session_id, limit as i64], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Unconsolidated messages of `user_id` created before `before`, oldest first.
pub async fn eligible_for_consolidation(
    db: &Database,
    user_id: &str,
    before: &str,
    limit: usize,
) -> Result<Vec<Message>, MurmurError> {
    let (user_id, before) = (user_id.to_string(), before.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE user_id = ?1 AND consolidated_at IS NULL AND created_at < ?2
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?3"
            ))?;
            let messages = stmt
                .query_map(params![user_id, before, limit as i64], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Users with at least one message eligible for consolidation.
pub async fn users_with_eligible_messages(
    db: &Database,
    before: &str,
) -> Result<Vec<String>, MurmurError> {
    let before = before.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT user_id FROM messages
                 WHERE consolidated_at IS NULL AND created_at < ?1
                 ORDER BY user_id",
            )?;
            let users = stmt
                .query_map(params![before], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(users)
        })
        .await
        .map_err(map_tr_err)
}

/// Turn free text into an FTS5 query: every word quoted, joined with OR.
///
/// Returns `None` when the text has no searchable words.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// BM25 search over a user's unconsolidated messages and summaries.
///
/// Scores are negated BM25, so larger is more relevant.
pub async fn keyword_search(
    db: &Database,
    user_id: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<MemorySnippet>, MurmurError> {
    let Some(fts) = fts_query(query) else {
        return Ok(Vec::new());
    };
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<MemorySnippet>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, kind, content, session_id, created_at, -bm25_score AS score FROM (
                     SELECT m.id AS id, 'message' AS kind, m.content AS content,
                            m.session_id AS session_id, m.created_at AS created_at,
                            bm25(messages_fts) AS bm25_score
                     FROM messages_fts JOIN messages m ON m.rowid = messages_fts.rowid
                     WHERE messages_fts MATCH ?1 AND m.user_id = ?2 AND m.consolidated_at IS NULL
                     UNION ALL
                     SELECT c.id, 'summary', c.content, NULL, c.created_at,
                            bm25(consolidated_fts)
                     FROM consolidated_fts JOIN consolidated_memories c
                          ON c.rowid = consolidated_fts.rowid
                     WHERE consolidated_fts MATCH ?1 AND c.user_id = ?2
                 )
                 ORDER BY bm25_score ASC, id ASC
                 LIMIT ?3",
            )?;
            let hits = stmt
                .query_map(params![fts, user_id, limit as i64], row_to_snippet)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(hits)
        })
        .await
        .map_err(map_tr_err)
}

/// Load retrievable items by id. Consolidated messages and ids belonging to
/// other users are skipped. Scores are zero.
pub async fn get_snippets(
    db: &Database,
    user_id: &str,
    ids: &[String],
) -> Result<Vec<MemorySnippet>, MurmurError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let user_id = user_id.to_string();
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| -> Result<Vec<MemorySnippet>, rusqlite::Error> {
            let marks = placeholders(2, ids.len());
            let sql = format!(
                "SELECT id, '{message}', content, session_id, created_at, 0.0 FROM messages
                 WHERE user_id = ?1 AND consolidated_at IS NULL AND id IN ({marks})
                 UNION ALL
                 SELECT id, '{summary}', content, NULL, created_at, 0.0 FROM consolidated_memories
                 WHERE user_id = ?1 AND id IN ({marks})",
                message = SnippetKind::Message,
                summary = SnippetKind::Summary,
            );
            let mut stmt = conn.prepare(&sql)?;
            let bind = std::iter::once(&user_id).chain(ids.iter());
            let snippets = stmt
                .query_map(params_from_iter(bind), row_to_snippet)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(snippets)
        })
        .await
        .map_err(map_tr_err)
}
