// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle queries.
//!
//! State changes are conditional updates on the current state so that races
//! with the idle sweep surface as "no row matched" rather than lost writes.

use murmur_core::MurmurError;
use murmur_core::types::{Session, SessionState};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::{is_constraint_violation, parse_column};

const SESSION_COLUMNS: &str =
    "id, user_id, state, started_at, last_activity_at, idled_at, closed_at, message_count";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        state: parse_column(row, 2)?,
        started_at: row.get(3)?,
        last_activity_at: row.get(4)?,
        idled_at: row.get(5)?,
        closed_at: row.get(6)?,
        message_count: row.get(7)?,
    })
}

/// Insert a new session.
///
/// Fails with `Validation` if the user already has an active session.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), MurmurError> {
    let session = session.clone();
    let user_id = session.user_id.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let result = conn.execute(
                "INSERT INTO sessions (id, user_id, state, started_at, last_activity_at, idled_at, closed_at, message_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id,
                    session.user_id,
                    session.state.to_string(),
                    session.started_at,
                    session.last_activity_at,
                    session.idled_at,
                    session.closed_at,
                    session.message_count,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(MurmurError::Validation(format!(
            "user {user_id} already has an active session"
        )))
    }
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, MurmurError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Session>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The active session of a user, if any.
pub async fn get_active_session_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Option<Session>, MurmurError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Session>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 AND state = 'active'"
                ),
                params![user_id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The idle session of a user that went idle most recently.
pub async fn get_latest_idle_session_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Option<Session>, MurmurError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Session>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1 AND state = 'idle'
                     ORDER BY idled_at DESC, last_activity_at DESC LIMIT 1"
                ),
                params![user_id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Bump `last_activity_at` if, and only if, the session is still active.
pub async fn touch_active_session(db: &Database, id: &str, at: &str) -> Result<bool, MurmurError> {
    let (id, at) = (id.to_string(), at.to_string());
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions SET last_activity_at = MAX(last_activity_at, ?2)
                 WHERE id = ?1 AND state = 'active'",
                params![id, at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Move an idle session back to active.
///
/// Returns false if the session is not idle any more, or if the user already
/// has another active session.
pub async fn reactivate_session(db: &Database, id: &str, at: &str) -> Result<bool, MurmurError> {
    let (id, at) = (id.to_string(), at.to_string());
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let result = conn.execute(
                "UPDATE sessions SET state = 'active', last_activity_at = ?2, idled_at = NULL
                 WHERE id = ?1 AND state = 'idle'",
                params![id, at],
            );
            match result {
                Ok(changed) => Ok(changed == 1),
                Err(e) if is_constraint_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Mark active sessions inactive since before `cutoff` as idle.
pub async fn mark_idle_sessions(
    db: &Database,
    cutoff: &str,
    at: &str,
) -> Result<Vec<Session>, MurmurError> {
    let (cutoff, at) = (cutoff.to_string(), at.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Session>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "UPDATE sessions SET state = 'idle', idled_at = ?2
                 WHERE state = 'active' AND last_activity_at < ?1
                 RETURNING {SESSION_COLUMNS}"
            ))?;
            let sessions = stmt
                .query_map(params![cutoff, at], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err)
}

/// Close a session from active or idle.
///
/// Returns false if it was already closed; `NotFound` if it never existed.
pub async fn close_session(db: &Database, id: &str, at: &str) -> Result<bool, MurmurError> {
    let (id_owned, at) = (id.to_string(), at.to_string());
    let outcome = db
        .connection()
        .call(move |conn| -> Result<Option<bool>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions SET state = 'closed', closed_at = ?2
                 WHERE id = ?1 AND state != 'closed'",
                params![id_owned, at],
            )?;
            if changed == 1 {
                return Ok(Some(true));
            }
            let exists = conn
                .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id_owned], |_| {
                    Ok(())
                })
                .optional()?;
            Ok(exists.map(|_| false))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| MurmurError::not_found("session", id))
}

/// Number of sessions currently active.
pub async fn count_active_sessions(db: &Database) -> Result<i64, MurmurError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE state = ?1",
                params![SessionState::Active.to_string()],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
