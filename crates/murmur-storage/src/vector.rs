// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact cosine-similarity vector index over the `vectors` table.
//!
//! Embeddings are stored as little-endian f32 BLOBs. Queries scan every
//! vector that passes the filter; this is fine at single-user scale.

use async_trait::async_trait;
use rusqlite::params;

use murmur_core::types::{VectorFilter, VectorHit, VectorMetadata};
use murmur_core::{AdapterType, HealthStatus, MurmurError, PluginAdapter, VectorIndex};

use crate::database::{Database, map_tr_err};
use crate::queries::placeholders;

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector. Trailing partial chunks are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity. Zero-norm or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// SQLite-backed [`VectorIndex`] sharing the relational database.
pub struct SqliteVectorIndex {
    db: Database,
}

impl SqliteVectorIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PluginAdapter for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite-vectors"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorIndex
    }

    async fn health_check(&self) -> Result<HealthStatus, MurmurError> {
        let count = self
            .db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
            })
            .await;
        match count {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MurmurError> {
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), MurmurError> {
        if vector.is_empty() {
            return Err(MurmurError::Validation(format!(
                "refusing to index empty vector for {id}"
            )));
        }
        let id = id.to_string();
        let user_id = metadata.user_id.clone();
        let kind = metadata.kind.to_string();
        let dimensions = vector.len() as i64;
        let blob = vec_to_blob(vector);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO vectors (id, user_id, kind, dimensions, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                         user_id = excluded.user_id,
                         kind = excluded.kind,
                         dimensions = excluded.dimensions,
                         embedding = excluded.embedding",
                    params![id, user_id, kind, dimensions, blob],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, MurmurError> {
        if top_k == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }
        let user_id = filter.user_id.clone();
        let dimensions = vector.len() as i64;
        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<(String, Vec<u8>)>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, embedding FROM vectors
                     WHERE dimensions = ?1 AND (?2 IS NULL OR user_id = ?2)",
                )?;
                let rows = stmt
                    .query_map(params![dimensions, user_id], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        let mut hits: Vec<VectorHit> = rows
            .into_iter()
            .map(|(id, blob)| VectorHit {
                similarity: cosine_similarity(vector, &blob_to_vec(&blob)),
                id,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn remove(&self, ids: &[String]) -> Result<(), MurmurError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids = ids.to_vec();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let sql = format!(
                    "DELETE FROM vectors WHERE id IN ({})",
                    placeholders(1, ids.len())
                );
                conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::types::SnippetKind;

    #[test]
    fn blob_round_trip() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    async fn index() -> (tempfile::TempDir, SqliteVectorIndex) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        (dir, SqliteVectorIndex::new(db))
    }

    fn meta(user: &str) -> VectorMetadata {
        VectorMetadata {
            user_id: user.into(),
            kind: SnippetKind::Message,
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity_and_filters_user() {
        let (_dir, idx) = index().await;
        idx.upsert("a", &[1.0, 0.0], &meta("u1")).await.unwrap();
        idx.upsert("b", &[0.7, 0.7], &meta("u1")).await.unwrap();
        idx.upsert("c", &[1.0, 0.0], &meta("u2")).await.unwrap();

        let filter = VectorFilter {
            user_id: Some("u1".into()),
        };
        let hits = idx.query(&[1.0, 0.0], 10, &filter).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let all = idx.query(&[1.0, 0.0], 1, &VectorFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "a");
    }

    #[tokio::test]
    async fn upsert_replaces_and_remove_deletes() {
        let (_dir, idx) = index().await;
        idx.upsert("a", &[1.0, 0.0], &meta("u1")).await.unwrap();
        idx.upsert("a", &[0.0, 1.0], &meta("u1")).await.unwrap();
        let hits = idx.query(&[0.0, 1.0], 5, &VectorFilter::default()).await.unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);

        idx.remove(&["a".to_string(), "missing".to_string()]).await.unwrap();
        assert!(idx.query(&[0.0, 1.0], 5, &VectorFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_vector_is_rejected() {
        let (_dir, idx) = index().await;
        let err = idx.upsert("a", &[], &meta("u1")).await.unwrap_err();
        assert!(matches!(err, MurmurError::Validation(_)));
    }
}
