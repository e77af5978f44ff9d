// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction into persistent memories.
//!
//! The generation model proposes durable facts from one exchange. Each
//! proposal is schema-checked, then compared against the user's active
//! memories; near-duplicates (normalized Levenshtein similarity at or above
//! the dedup threshold) are skipped.

use std::sync::Arc;

use tracing::{debug, warn};

use murmur_config::model::ExtractionConfig;
use murmur_core::time::{format_timestamp, new_id};
use murmur_core::types::{GenerateOptions, PersistentMemory};
use murmur_core::{Clock, MurmurError, ProviderAdapter, StorageAdapter};
use murmur_resilience::{BreakerRegistry, Dependency};

use crate::entity::name_similarity;
use crate::parse::{ExtractedFact, FactParser};

const EXTRACTION_PROMPT: &str = r#"Extract facts about the user from this exchange that are worth remembering in future conversations. Output a JSON array.

For each fact:
- "category": one of schedule, fact, task, preference, reminder, other
- "content": the fact as a standalone statement (e.g. "The user's dentist appointment is Friday at 3pm")
- "importance": an integer from 1 (trivia) to 10 (critical)
- "tags": a few short lowercase keywords

Only include facts stated or confirmed by the user. If there is nothing worth remembering, return [].

User: {user}
Assistant: {assistant}

Output the JSON array only:"#;

/// Extracts facts from exchanges and stores the new ones.
pub struct FactExtractor {
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    breakers: Arc<BreakerRegistry>,
    clock: Arc<dyn Clock>,
    parser: FactParser,
    config: ExtractionConfig,
}

impl FactExtractor {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        breakers: Arc<BreakerRegistry>,
        clock: Arc<dyn Clock>,
        config: ExtractionConfig,
    ) -> Result<Self, MurmurError> {
        Ok(Self {
            storage,
            provider,
            breakers,
            clock,
            parser: FactParser::new()?,
            config,
        })
    }

    /// Propose facts for one exchange. Unavailable or malformed model
    /// output yields an empty list.
    pub async fn propose(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Vec<ExtractedFact> {
        let prompt = EXTRACTION_PROMPT
            .replace("{user}", user_text)
            .replace("{assistant}", assistant_text);
        let provider = Arc::clone(&self.provider);
        let options = GenerateOptions {
            temperature: Some(0.0),
            json: true,
            ..GenerateOptions::default()
        };
        let raw = match self
            .breakers
            .get(Dependency::LlmGenerate)
            .call(async move { provider.generate(&prompt, &options).await })
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = user_id, error = %e, "fact extraction call failed");
                return Vec::new();
            }
        };
        self.parser.parse(&raw).unwrap_or_else(|e| {
            warn!(user = user_id, error = %e, "discarding unparseable fact output");
            Vec::new()
        })
    }

    /// Extract facts from one exchange and store those not already known.
    ///
    /// Returns the memories that were created.
    pub async fn extract_and_store(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<Vec<PersistentMemory>, MurmurError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        let facts = self.propose(user_id, user_text, assistant_text).await;
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let mut known: Vec<String> = self
            .storage
            .list_active_memories(user_id)
            .await?
            .into_iter()
            .map(|m| m.content)
            .collect();

        let mut created = Vec::new();
        for fact in facts {
            if let Some(existing) = self.find_duplicate(&fact.content, &known) {
                debug!(user = user_id, fact = %fact.content, existing, "skipping duplicate fact");
                continue;
            }
            let memory = PersistentMemory {
                id: new_id(),
                user_id: user_id.to_string(),
                category: fact.category,
                content: fact.content,
                importance: fact.importance,
                tags: fact.tags,
                session_id: session_id.map(str::to_string),
                created_at: format_timestamp(self.clock.now()),
                active: true,
            };
            self.storage.insert_memory(&memory).await?;
            known.push(memory.content.clone());
            created.push(memory);
        }
        Ok(created)
    }

    fn find_duplicate<'a>(&self, content: &str, known: &'a [String]) -> Option<&'a str> {
        known
            .iter()
            .find(|k| name_similarity(k, content) >= self.config.dedup_threshold)
            .map(String::as_str)
    }
}
