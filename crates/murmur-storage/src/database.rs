// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All access is serialized through tokio-rusqlite's single background
//! thread; each query module call is one short transaction.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;

use murmur_core::MurmurError;

use crate::migrations::run_migrations;

const CONNECTION_PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
    PRAGMA synchronous = NORMAL;
";

/// Shared handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (creating if needed) the database at `path`, switch it to WAL
    /// mode when asked, and apply pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, MurmurError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MurmurError::Storage {
                source: Box::new(e),
            })?;
        }

        // Migrations run on a plain blocking connection before the async
        // handle is opened.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), MurmurError> {
            let mut conn = rusqlite::Connection::open(&migrate_path)
                .map_err(|e| MurmurError::Storage { source: Box::new(e) })?;
            if wal_mode {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })
                .map_err(|e| MurmurError::Storage { source: Box::new(e) })?;
            }
            conn.execute_batch(CONNECTION_PRAGMAS)
                .map_err(|e| MurmurError::Storage { source: Box::new(e) })?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| MurmurError::Internal(format!("migration task failed: {e}")))??;

        let conn = Connection::open(path).await.map_err(MurmurError::storage)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The async connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), MurmurError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into a storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MurmurError {
    MurmurError::storage(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/murmur.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        for expected in [
            "sessions",
            "messages",
            "persistent_memories",
            "entities",
            "entity_surface_forms",
            "consolidated_memories",
            "consolidation_runs",
            "vectors",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.db");
        let path = path.to_str().unwrap();
        Database::open(path, true).await.unwrap();
        Database::open(path, true).await.unwrap();
    }
}
