// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retriever combining vector similarity and BM25 via weighted RRF.
//!
//! The retriever embeds the query through the `llm_embed` breaker, runs a
//! user-scoped vector query and an FTS5 keyword query, fuses both rankings
//! with weighted Reciprocal Rank Fusion, and loads the winning snippets.
//! Every failure on this read path degrades the result instead of failing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use murmur_config::model::RetrievalConfig;
use murmur_core::types::{MemorySnippet, VectorFilter};
use murmur_core::{EmbeddingAdapter, MurmurError, StorageAdapter, VectorIndex};
use murmur_resilience::{BreakerRegistry, Dependency};

/// Weights and damping constant for [`fuse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub semantic: f64,
    pub keyword: f64,
    pub k: f64,
}

impl From<&RetrievalConfig> for FusionWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            keyword: config.keyword_weight,
            k: config.rrf_k,
        }
    }
}

/// Fuse two ranked id lists with weighted RRF.
///
/// Ranks are 1-based list positions; repeated ids keep their best rank. An
/// id missing from a list contributes nothing for that list. The result is
/// sorted by fused score descending, then id ascending, and cut to `limit`.
pub fn fuse(
    semantic: &[String],
    keyword: &[String],
    weights: &FusionWeights,
    limit: usize,
) -> Vec<(String, f64)> {
    fuse_ranked(ranks(semantic), ranks(keyword), weights, limit)
}

/// [`fuse`] over explicit `(id, rank)` pairs in any order.
pub fn fuse_ranked(
    semantic: impl IntoIterator<Item = (String, usize)>,
    keyword: impl IntoIterator<Item = (String, usize)>,
    weights: &FusionWeights,
    limit: usize,
) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (list, weight) in [
        (best_ranks(semantic), weights.semantic),
        (best_ranks(keyword), weights.keyword),
    ] {
        for (id, rank) in list {
            *scores.entry(id).or_insert(0.0) += weight / (weights.k + rank as f64);
        }
    }

    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    fused.truncate(limit);
    fused
}

fn ranks(list: &[String]) -> impl Iterator<Item = (String, usize)> + '_ {
    list.iter().enumerate().map(|(i, id)| (id.clone(), i + 1))
}

fn best_ranks(list: impl IntoIterator<Item = (String, usize)>) -> HashMap<String, usize> {
    let mut best: HashMap<String, usize> = HashMap::new();
    for (id, rank) in list {
        best.entry(id)
            .and_modify(|r| *r = (*r).min(rank))
            .or_insert(rank);
    }
    best
}

/// Snippets produced by one retrieval plus whether any source was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub snippets: Vec<MemorySnippet>,
    pub degraded: bool,
}

/// Hybrid semantic + keyword retriever over a user's messages and summaries.
pub struct HybridRetriever {
    storage: Arc<dyn StorageAdapter>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingAdapter>,
    breakers: Arc<BreakerRegistry>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingAdapter>,
        breakers: Arc<BreakerRegistry>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            storage,
            vectors,
            embedder,
            breakers,
            config,
        }
    }

    /// Retrieve up to `limit` fused snippets for `query`.
    ///
    /// Never fails: a skipped source sets `degraded`, and exceeding the
    /// retrieval timeout yields an empty degraded result.
    pub async fn retrieve(&self, user_id: &str, query: &str, limit: usize) -> Retrieval {
        if query.trim().is_empty() || limit == 0 {
            return Retrieval::default();
        }
        let started = Instant::now();
        let inner = self.retrieve_inner(user_id, query, limit);
        let result = tokio::time::timeout(self.config.timeout(), inner)
            .await
            .unwrap_or_else(|_| {
                warn!(user = user_id, timeout_ms = self.config.timeout_ms, "retrieval timed out");
                metrics::counter!("murmur_retrieval_degraded_total", "reason" => "timeout")
                    .increment(1);
                Retrieval {
                    snippets: Vec::new(),
                    degraded: true,
                }
            });
        metrics::histogram!("murmur_retrieval_latency_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn retrieve_inner(&self, user_id: &str, query: &str, limit: usize) -> Retrieval {
        let (semantic, keyword) = tokio::join!(
            self.semantic_ranking(user_id, query),
            self.keyword_ranking(user_id, query),
        );

        let mut degraded = false;
        let semantic = semantic.unwrap_or_else(|e| {
            degraded = true;
            warn!(user = user_id, error = %e, "semantic search unavailable, using keyword results only");
            metrics::counter!("murmur_retrieval_degraded_total", "reason" => "semantic")
                .increment(1);
            Vec::new()
        });
        let keyword = keyword.unwrap_or_else(|e| {
            degraded = true;
            warn!(user = user_id, error = %e, "keyword search failed");
            metrics::counter!("murmur_retrieval_degraded_total", "reason" => "keyword")
                .increment(1);
            Vec::new()
        });

        // Fuse every candidate; ids the store no longer serves are dropped
        // below, before the limit applies.
        let candidates = semantic.len() + keyword.len();
        let fused = fuse(&semantic, &keyword, &FusionWeights::from(&self.config), candidates);
        debug!(
            user = user_id,
            semantic = semantic.len(),
            keyword = keyword.len(),
            fused = fused.len(),
            "fused retrieval candidates"
        );
        if fused.is_empty() {
            return Retrieval {
                snippets: Vec::new(),
                degraded,
            };
        }

        let ids: Vec<String> = fused.iter().map(|(id, _)| id.clone()).collect();
        let storage = Arc::clone(&self.storage);
        let owner = user_id.to_string();
        let loaded = self
            .breakers
            .get(Dependency::Db)
            .call(async move { storage.get_snippets(&owner, &ids).await })
            .await;
        let loaded = match loaded {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(user = user_id, error = %e, "failed to load retrieved snippets");
                metrics::counter!("murmur_retrieval_degraded_total", "reason" => "load")
                    .increment(1);
                return Retrieval {
                    snippets: Vec::new(),
                    degraded: true,
                };
            }
        };

        let mut by_id: HashMap<String, MemorySnippet> =
            loaded.into_iter().map(|s| (s.id.clone(), s)).collect();
        let snippets = fused
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.remove(&id).map(|mut snippet| {
                    snippet.score = score;
                    snippet
                })
            })
            .take(limit)
            .collect();
        Retrieval { snippets, degraded }
    }

    /// Ids ranked by cosine similarity, keeping those at or above the threshold.
    async fn semantic_ranking(&self, user_id: &str, query: &str) -> Result<Vec<String>, MurmurError> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = self
            .breakers
            .get(Dependency::LlmEmbed)
            .call(async move { embedder.embed(&text).await })
            .await?;

        let vectors = Arc::clone(&self.vectors);
        let filter = VectorFilter {
            user_id: Some(user_id.to_string()),
        };
        let top_k = self.config.candidate_limit;
        let hits = self
            .breakers
            .get(Dependency::Db)
            .call(async move { vectors.query(&vector, top_k, &filter).await })
            .await?;

        let threshold = self.config.similarity_threshold;
        Ok(hits
            .into_iter()
            .filter(|hit| hit.similarity >= threshold)
            .map(|hit| hit.id)
            .collect())
    }

    /// Ids ranked by the store's full-text relevance.
    async fn keyword_ranking(&self, user_id: &str, query: &str) -> Result<Vec<String>, MurmurError> {
        let storage = Arc::clone(&self.storage);
        let (owner, text) = (user_id.to_string(), query.to_string());
        let limit = self.config.candidate_limit;
        let hits = self
            .breakers
            .get(Dependency::Db)
            .call(async move { storage.keyword_search(&owner, &text, limit).await })
            .await?;
        Ok(hits.into_iter().map(|s| s.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn weights() -> FusionWeights {
        FusionWeights {
            semantic: 0.7,
            keyword: 0.3,
            k: 60.0,
        }
    }

    #[test]
    fn weighted_rrf_scores() {
        let fused = fuse(&ids(&["a", "b"]), &ids(&["b", "c"]), &weights(), 10);
        let score = |id: &str| fused.iter().find(|(i, _)| i == id).unwrap().1;
        assert!((score("a") - 0.7 / 61.0).abs() < 1e-12);
        assert!((score("b") - (0.7 / 62.0 + 0.3 / 61.0)).abs() < 1e-12);
        assert!((score("c") - 0.3 / 62.0).abs() < 1e-12);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn duplicates_keep_best_rank_and_appear_once() {
        let fused = fuse(&ids(&["a", "a", "b"]), &[], &weights(), 10);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].1 - 0.7 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn keyword_only_when_semantic_empty() {
        let fused = fuse(&[], &ids(&["x", "y"]), &weights(), 1);
        assert_eq!(fused, vec![("x".to_string(), 0.3 / 61.0)]);
    }

    #[test]
    fn ties_break_by_id() {
        let even = FusionWeights {
            semantic: 0.5,
            keyword: 0.5,
            k: 60.0,
        };
        let fused = fuse(&ids(&["b", "a"]), &ids(&["a", "b"]), &even, 10);
        assert_eq!(fused[0].0, "a");
        assert_eq!(fused[1].0, "b");
    }

    fn id_list() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-f]", 0..8)
    }

    proptest! {
        #[test]
        fn fusion_ignores_input_iteration_order(semantic in id_list(), keyword in id_list()) {
            let forward = fuse(&semantic, &keyword, &weights(), 20);
            let sem_rev: Vec<(String, usize)> = ranks(&semantic).collect::<Vec<_>>().into_iter().rev().collect();
            let kw_rev: Vec<(String, usize)> = ranks(&keyword).collect::<Vec<_>>().into_iter().rev().collect();
            let reversed = fuse_ranked(sem_rev, kw_rev, &weights(), 20);
            prop_assert_eq!(&forward, &reversed);
            prop_assert_eq!(forward, fuse(&semantic, &keyword, &weights(), 20));
        }

        #[test]
        fn item_in_both_lists_outranks_single_list_item(rank in 1usize..20, w in 0.01f64..1.0) {
            let weights = FusionWeights { semantic: w, keyword: 1.0 - w + 0.01, k: 60.0 };
            let both = fuse_ranked(
                [("both".to_string(), rank), ("sem".to_string(), rank)],
                [("both".to_string(), rank), ("kw".to_string(), rank)],
                &weights,
                10,
            );
            prop_assert_eq!(both[0].0.as_str(), "both");
        }
    }
}
