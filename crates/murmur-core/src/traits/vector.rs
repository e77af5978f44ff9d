// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index trait for semantic similarity search.

use async_trait::async_trait;

use crate::error::MurmurError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{VectorFilter, VectorHit, VectorMetadata};

/// Similarity index over message and summary embeddings.
///
/// No particular index algorithm is implied; an exact scan satisfies the
/// contract as well as an approximate index.
#[async_trait]
pub trait VectorIndex: PluginAdapter {
    /// Inserts or replaces the vector stored under `id`.
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> Result<(), MurmurError>;

    /// Returns up to `top_k` hits ordered by descending cosine similarity.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<VectorHit>, MurmurError>;

    /// Removes the given ids. Unknown ids are ignored.
    async fn remove(&self, ids: &[String]) -> Result<(), MurmurError>;
}
