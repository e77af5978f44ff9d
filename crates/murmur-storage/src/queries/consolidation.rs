// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consolidated summaries and the consolidation audit log.

use murmur_core::MurmurError;
use murmur_core::types::{ConsolidatedMemory, ConsolidationRun};
use rusqlite::{params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::queries::placeholders;

/// Store a summary and mark its source messages consolidated, atomically.
///
/// Only messages with `consolidated_at IS NULL` are marked, so a message is
/// consolidated at most once. If none of the sources is still eligible the
/// transaction is rolled back and the summary is not stored.
pub async fn commit_consolidation(
    db: &Database,
    summary: &ConsolidatedMemory,
    at: &str,
) -> Result<usize, MurmurError> {
    if summary.source_message_ids.is_empty() {
        return Ok(0);
    }
    let summary = summary.clone();
    let source_ids = serde_json::to_string(&summary.source_message_ids).map_err(|e| {
        MurmurError::Storage {
            source: Box::new(e),
        }
    })?;
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO consolidated_memories
                     (id, user_id, content, source_message_ids, period_start, period_end, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    summary.id,
                    summary.user_id,
                    summary.content,
                    source_ids,
                    summary.period_start,
                    summary.period_end,
                    summary.created_at,
                ],
            )?;

            let sql = format!(
                "UPDATE messages SET consolidated_at = ?1, consolidated_summary_id = ?2
                 WHERE consolidated_at IS NULL AND user_id = ?3 AND id IN ({})",
                placeholders(4, summary.source_message_ids.len())
            );
            let head = [&at, &summary.id, &summary.user_id];
            let bind = head.into_iter().chain(summary.source_message_ids.iter());
            let marked = tx.execute(&sql, params_from_iter(bind))?;

            if marked == 0 {
                // Dropping the transaction rolls the summary back.
                return Ok(0);
            }
            tx.commit()?;
            Ok(marked)
        })
        .await
        .map_err(map_tr_err)
}

/// Append an audit row.
pub async fn insert_consolidation_run(
    db: &Database,
    run: &ConsolidationRun,
) -> Result<(), MurmurError> {
    let run = run.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO consolidation_runs
                     (id, user_id, cutoff_date, messages_consolidated, summaries_created,
                      tokens_saved_estimate, run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run.id,
                    run.user_id,
                    run.cutoff_date,
                    run.messages_consolidated,
                    run.summaries_created,
                    run.tokens_saved_estimate,
                    run.run_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent audit rows, optionally for one user.
pub async fn list_consolidation_runs(
    db: &Database,
    user_id: Option<&str>,
    limit: usize,
) -> Result<Vec<ConsolidationRun>, MurmurError> {
    let user_id = user_id.map(|u| u.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<ConsolidationRun>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, cutoff_date, messages_consolidated, summaries_created,
                        tokens_saved_estimate, run_at
                 FROM consolidation_runs
                 WHERE ?1 IS NULL OR user_id = ?1
                 ORDER BY run_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let runs = stmt
                .query_map(params![user_id, limit as i64], |row| {
                    Ok(ConsolidationRun {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        cutoff_date: row.get(2)?,
                        messages_consolidated: row.get(3)?,
                        summaries_created: row.get(4)?,
                        tokens_saved_estimate: row.get(5)?,
                        run_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(runs)
        })
        .await
        .map_err(map_tr_err)
}
