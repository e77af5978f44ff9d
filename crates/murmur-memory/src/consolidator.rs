// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background compression of aged raw messages into summaries.
//!
//! A run selects a user's unconsolidated messages older than the cutoff,
//! groups them into chunks of `chunk_min..=chunk_max`, summarizes each chunk
//! through the `llm_generate` breaker, and commits summary plus message
//! marks in one store transaction. A chunk whose summary fails is left for
//! the next run. One audit row is written per user per invocation.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tiktoken_rs::CoreBPE;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use murmur_config::model::ConsolidationConfig;
use murmur_core::time::{format_timestamp, new_id};
use murmur_core::types::{
    ConsolidatedMemory, ConsolidationRun, GenerateOptions, Message, SnippetKind, VectorMetadata,
};
use murmur_core::{
    Clock, EmbeddingAdapter, MurmurError, ProviderAdapter, StorageAdapter, VectorIndex,
};
use murmur_resilience::{BreakerRegistry, Dependency};

use crate::parse::parse_summary;

/// Upper bound on messages considered for one user in one run.
const MAX_MESSAGES_PER_RUN: usize = 2000;

const SUMMARY_PROMPT: &str = r#"Summarize the following conversation excerpt in 2-3 sentences. Keep names, dates, commitments, and preferences; drop small talk.

{transcript}

Summary:"#;

/// Token counter for savings estimates. Falls back to chars/4 when the
/// BPE tables cannot be loaded.
pub struct TokenEstimator {
    bpe: Option<CoreBPE>,
}

impl TokenEstimator {
    pub fn new() -> Self {
        let bpe = match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "cl100k_base unavailable, estimating tokens from length");
                None
            }
        };
        Self { bpe }
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count().div_ceil(4),
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `messages` into chunks of at most `max`; a trailing chunk shorter
/// than `min` is left out.
pub fn plan_chunks(messages: &[Message], min: usize, max: usize) -> Vec<&[Message]> {
    let max = max.max(1);
    messages
        .chunks(max)
        .filter(|chunk| chunk.len() >= min.max(1))
        .collect()
}

fn transcript(chunk: &[Message]) -> String {
    chunk
        .iter()
        .map(|m| format!("[{}] {}: {}", m.created_at, m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summarizes aged history. Runs are serialized by an internal lock.
pub struct Consolidator {
    storage: Arc<dyn StorageAdapter>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    breakers: Arc<BreakerRegistry>,
    clock: Arc<dyn Clock>,
    config: ConsolidationConfig,
    tokens: TokenEstimator,
    run_lock: Mutex<()>,
}

impl Consolidator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        breakers: Arc<BreakerRegistry>,
        clock: Arc<dyn Clock>,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            storage,
            vectors,
            embedder,
            provider,
            breakers,
            clock,
            config,
            tokens: TokenEstimator::new(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Consolidate one user, or every user with eligible messages.
    ///
    /// `cutoff_days` overrides the configured age. Returns one audit record
    /// per processed user. A user whose run fails is logged and skipped;
    /// the call fails only when every user failed.
    pub async fn run(
        &self,
        user_id: Option<&str>,
        cutoff_days: Option<u32>,
    ) -> Result<Vec<ConsolidationRun>, MurmurError> {
        let _guard = self.run_lock.lock().await;

        let days = cutoff_days.unwrap_or(self.config.cutoff_days);
        let cutoff = format_timestamp(self.clock.now() - ChronoDuration::days(i64::from(days)));
        let users = match user_id {
            Some(user) => vec![user.to_string()],
            None => self.storage.users_with_eligible_messages(&cutoff).await?,
        };

        let mut runs = Vec::with_capacity(users.len());
        let mut first_failure = None;
        for user in users {
            match self.run_for_user(&user, &cutoff).await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!(user = %user, error = %e, "consolidation failed for user");
                    first_failure.get_or_insert(e);
                }
            }
        }
        match first_failure {
            Some(e) if runs.is_empty() => Err(e),
            _ => Ok(runs),
        }
    }

    pub async fn list_runs(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConsolidationRun>, MurmurError> {
        self.storage.list_consolidation_runs(user_id, limit).await
    }

    async fn run_for_user(&self, user_id: &str, cutoff: &str) -> Result<ConsolidationRun, MurmurError> {
        let eligible = self
            .storage
            .eligible_for_consolidation(user_id, cutoff, MAX_MESSAGES_PER_RUN)
            .await?;
        let chunks = plan_chunks(&eligible, self.config.chunk_min, self.config.chunk_max);
        debug!(user = user_id, eligible = eligible.len(), chunks = chunks.len(), "consolidation plan");

        let mut messages_consolidated: i64 = 0;
        let mut summaries_created: i64 = 0;
        let mut tokens_saved: i64 = 0;

        for chunk in chunks {
            let summary = match self.summarize(chunk).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(user = user_id, size = chunk.len(), error = %e, "skipping chunk, summary failed");
                    continue;
                }
            };

            let now = format_timestamp(self.clock.now());
            let memory = ConsolidatedMemory {
                id: new_id(),
                user_id: user_id.to_string(),
                content: summary,
                source_message_ids: chunk.iter().map(|m| m.id.clone()).collect(),
                period_start: chunk.first().map(|m| m.created_at.clone()).unwrap_or_default(),
                period_end: chunk.last().map(|m| m.created_at.clone()).unwrap_or_default(),
                created_at: now.clone(),
            };
            let marked = match self.storage.commit_consolidation(&memory, &now).await {
                Ok(marked) => marked,
                Err(e) => {
                    warn!(user = user_id, size = chunk.len(), error = %e, "skipping chunk, commit failed");
                    continue;
                }
            };
            if marked == 0 {
                debug!(user = user_id, "chunk already consolidated elsewhere");
                continue;
            }

            messages_consolidated += marked as i64;
            summaries_created += 1;
            let before: usize = chunk.iter().map(|m| self.tokens.count(&m.content)).sum();
            let after = self.tokens.count(&memory.content);
            tokens_saved += before.saturating_sub(after) as i64;

            self.reindex(user_id, &memory).await;
        }

        let run = ConsolidationRun {
            id: new_id(),
            user_id: user_id.to_string(),
            cutoff_date: cutoff.to_string(),
            messages_consolidated,
            summaries_created,
            tokens_saved_estimate: tokens_saved,
            run_at: format_timestamp(self.clock.now()),
        };
        if let Err(e) = self.storage.insert_consolidation_run(&run).await {
            error!(
                user = user_id,
                messages = messages_consolidated,
                summaries = summaries_created,
                error = %e,
                "consolidation committed but its audit record was not written"
            );
            return Err(e);
        }
        metrics::counter!("murmur_consolidated_messages_total")
            .increment(messages_consolidated as u64);
        info!(
            user = user_id,
            messages = messages_consolidated,
            summaries = summaries_created,
            tokens_saved,
            "consolidation run complete"
        );
        Ok(run)
    }

    async fn summarize(&self, chunk: &[Message]) -> Result<String, MurmurError> {
        let prompt = SUMMARY_PROMPT.replace("{transcript}", &transcript(chunk));
        let provider = Arc::clone(&self.provider);
        let options = GenerateOptions {
            max_tokens: Some(256),
            temperature: Some(0.2),
            ..GenerateOptions::default()
        };
        let raw = self
            .breakers
            .get(Dependency::LlmGenerate)
            .call(async move { provider.generate(&prompt, &options).await })
            .await?;
        parse_summary(&raw)
    }

    /// Index the summary and drop the vectors of the messages it replaces.
    /// Failures only cost semantic recall, so they are logged.
    async fn reindex(&self, user_id: &str, memory: &ConsolidatedMemory) {
        if let Err(e) = self.vectors.remove(&memory.source_message_ids).await {
            warn!(user = user_id, error = %e, "failed to drop consolidated message vectors");
        }

        let embedder = Arc::clone(&self.embedder);
        let text = memory.content.clone();
        let embedding = self
            .breakers
            .get(Dependency::LlmEmbed)
            .call(async move { embedder.embed(&text).await })
            .await;
        let result = match embedding {
            Ok(vector) => {
                let metadata = VectorMetadata {
                    user_id: user_id.to_string(),
                    kind: SnippetKind::Summary,
                };
                self.vectors.upsert(&memory.id, &vector, &metadata).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(user = user_id, summary = %memory.id, error = %e, "summary stored without embedding");
        }
    }
}
