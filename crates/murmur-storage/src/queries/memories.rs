// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent memory queries. Memories are soft-deleted, never removed.

use murmur_core::MurmurError;
use murmur_core::types::PersistentMemory;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::{json_column, parse_column};

const MEMORY_COLUMNS: &str =
    "id, user_id, category, content, importance, tags, session_id, created_at, active";

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistentMemory> {
    Ok(PersistentMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: parse_column(row, 2)?,
        content: row.get(3)?,
        importance: row.get(4)?,
        tags: json_column(row, 5)?,
        session_id: row.get(6)?,
        created_at: row.get(7)?,
        active: row.get(8)?,
    })
}

/// Insert a new memory.
pub async fn insert_memory(db: &Database, memory: &PersistentMemory) -> Result<(), MurmurError> {
    let memory = memory.clone();
    let tags = serde_json::to_string(&memory.tags).map_err(|e| MurmurError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO persistent_memories ({MEMORY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    memory.id,
                    memory.user_id,
                    memory.category.to_string(),
                    memory.content,
                    memory.importance,
                    tags,
                    memory.session_id,
                    memory.created_at,
                    memory.active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a memory by ID, active or not.
pub async fn get_memory(db: &Database, id: &str) -> Result<Option<PersistentMemory>, MurmurError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<PersistentMemory>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM persistent_memories WHERE id = ?1"),
                params![id],
                row_to_memory,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All active memories of a user, newest first.
pub async fn list_active_memories(
    db: &Database,
    user_id: &str,
) -> Result<Vec<PersistentMemory>, MurmurError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<PersistentMemory>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM persistent_memories
                 WHERE user_id = ?1 AND active = 1
                 ORDER BY created_at DESC"
            ))?;
            let memories = stmt
                .query_map(params![user_id], row_to_memory)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(memories)
        })
        .await
        .map_err(map_tr_err)
}

/// Top active memories by `(importance DESC, created_at DESC)`.
pub async fn top_memories(
    db: &Database,
    user_id: &str,
    limit: usize,
) -> Result<Vec<PersistentMemory>, MurmurError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<PersistentMemory>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM persistent_memories
                 WHERE user_id = ?1 AND active = 1
                 ORDER BY importance DESC, created_at DESC, id ASC
                 LIMIT ?2"
            ))?;
            let memories = stmt
                .query_map(params![user_id, limit as i64], row_to_memory)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(memories)
        })
        .await
        .map_err(map_tr_err)
}

/// Soft delete. Returns false if already inactive; `NotFound` if missing.
pub async fn deactivate_memory(db: &Database, id: &str) -> Result<bool, MurmurError> {
    let id_owned = id.to_string();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<Option<bool>, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE persistent_memories SET active = 0 WHERE id = ?1 AND active = 1",
                params![id_owned],
            )?;
            if changed == 1 {
                return Ok(Some(true));
            }
            let exists = conn
                .query_row(
                    "SELECT 1 FROM persistent_memories WHERE id = ?1",
                    params![id_owned],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(exists.map(|_| false))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| MurmurError::not_found("memory", id))
}
