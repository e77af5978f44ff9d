// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical entity and surface form queries.

use murmur_core::MurmurError;
use murmur_core::types::{Entity, EntityType};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

const ENTITY_COLUMNS: &str =
    "id, user_id, entity_type, canonical_name, confidence, first_seen_at, last_seen_at";

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        entity_type: parse_column(row, 2)?,
        canonical_name: row.get(3)?,
        surface_forms: Vec::new(),
        confidence: row.get(4)?,
        first_seen_at: row.get(5)?,
        last_seen_at: row.get(6)?,
    })
}

/// Lowercased, trimmed form used for surface form uniqueness.
pub fn normalize_surface_form(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Fill in `surface_forms` for every entity, in first-seen order.
fn attach_surface_forms(
    conn: &rusqlite::Connection,
    entities: &mut [Entity],
) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT surface_form FROM entity_surface_forms
         WHERE entity_id = ?1 ORDER BY first_seen_at ASC, rowid ASC",
    )?;
    for entity in entities.iter_mut() {
        entity.surface_forms = stmt
            .query_map(params![entity.id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
    }
    Ok(())
}

/// Entities of a user, optionally restricted to one type, oldest first.
pub async fn list_entities(
    db: &Database,
    user_id: &str,
    entity_type: Option<EntityType>,
) -> Result<Vec<Entity>, MurmurError> {
    let user_id = user_id.to_string();
    let entity_type = entity_type.map(|t| t.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Entity>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTITY_COLUMNS} FROM entities
                 WHERE user_id = ?1 AND (?2 IS NULL OR entity_type = ?2)
                 ORDER BY first_seen_at ASC, id ASC"
            ))?;
            let mut entities = stmt
                .query_map(params![user_id, entity_type], row_to_entity)?
                .collect::<Result<Vec<_>, _>>()?;
            attach_surface_forms(conn, &mut entities)?;
            Ok(entities)
        })
        .await
        .map_err(map_tr_err)
}

/// Get an entity with its surface forms.
pub async fn get_entity(db: &Database, id: &str) -> Result<Option<Entity>, MurmurError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Entity>, rusqlite::Error> {
            let entity = conn
                .query_row(
                    &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
                    params![id],
                    row_to_entity,
                )
                .optional()?;
            let Some(entity) = entity else {
                return Ok(None);
            };
            let mut one = [entity];
            attach_surface_forms(conn, &mut one)?;
            let [entity] = one;
            Ok(Some(entity))
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new canonical entity together with its surface forms.
pub async fn insert_entity(db: &Database, entity: &Entity) -> Result<(), MurmurError> {
    let entity = entity.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO entities ({ENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    entity.id,
                    entity.user_id,
                    entity.entity_type.to_string(),
                    entity.canonical_name,
                    entity.confidence,
                    entity.first_seen_at,
                    entity.last_seen_at,
                ],
            )?;
            for form in &entity.surface_forms {
                tx.execute(
                    "INSERT OR IGNORE INTO entity_surface_forms
                         (entity_id, surface_form, normalized, first_seen_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        entity.id,
                        form,
                        normalize_surface_form(form),
                        entity.first_seen_at
                    ],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Record a mention of an existing entity: add the surface form if new,
/// bump `last_seen_at`, and keep the highest confidence seen.
pub async fn add_surface_form(
    db: &Database,
    entity_id: &str,
    surface_form: &str,
    confidence: f64,
    at: &str,
) -> Result<(), MurmurError> {
    let entity_id_owned = entity_id.to_string();
    let surface_form = surface_form.to_string();
    let at = at.to_string();
    let found = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE entities
                 SET last_seen_at = MAX(last_seen_at, ?2), confidence = MAX(confidence, ?3)
                 WHERE id = ?1",
                params![entity_id_owned, at, confidence],
            )?;
            if updated == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT OR IGNORE INTO entity_surface_forms
                     (entity_id, surface_form, normalized, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entity_id_owned,
                    surface_form,
                    normalize_surface_form(&surface_form),
                    at
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;

    if found {
        Ok(())
    } else {
        Err(MurmurError::not_found("entity", entity_id))
    }
}

/// Administrative hard delete of an entity and its surface forms.
pub async fn delete_entity(db: &Database, id: &str) -> Result<bool, MurmurError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM entity_surface_forms WHERE entity_id = ?1",
                params![id],
            )?;
            let deleted = tx.execute("DELETE FROM entities WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(deleted == 1)
        })
        .await
        .map_err(map_tr_err)
}
