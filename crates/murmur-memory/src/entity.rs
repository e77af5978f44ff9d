// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named-entity extraction and canonicalization.
//!
//! Extraction asks the generation model for a JSON list of mentions through
//! the `llm_generate` breaker. Resolution compares a mention against every
//! canonical entity of the same user and type with normalized Levenshtein
//! similarity and either attaches it as a surface form or creates a new
//! canonical entity. Resolution for one user is serialized so two
//! concurrent mentions of a new name cannot create two canonical ids.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use murmur_config::model::EntityConfig;
use murmur_core::time::{format_timestamp, new_id};
use murmur_core::types::{Entity, EntityType, ExtractedEntity, GenerateOptions};
use murmur_core::{CacheAdapter, Clock, MurmurError, ProviderAdapter, StorageAdapter};
use murmur_resilience::{BreakerRegistry, Dependency};

use crate::parse::EntityParser;

const EXTRACTION_PROMPT: &str = r#"Identify the named entities mentioned in this exchange.

Return a JSON array. Each element is an object with:
- "text": the entity exactly as written
- "type": one of PERSON, PLACE, ORGANIZATION, DATE, TIME, EVENT, OTHER
- "confidence": a number between 0 and 1
- "context": the short phrase the entity appeared in

If there are no entities, return [].

User: {user}
Assistant: {assistant}

Output the JSON array only:"#;

/// Case-folded, whitespace-collapsed form used for similarity comparisons.
pub fn normalize_name(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity in `[0, 1]` between two names after normalization.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_name(a), &normalize_name(b))
}

/// Best similarity between `text` and any name the entity is known by.
fn best_match_score(entity: &Entity, text: &str) -> f64 {
    std::iter::once(&entity.canonical_name)
        .chain(entity.surface_forms.iter())
        .map(|form| name_similarity(form, text))
        .fold(0.0, f64::max)
}

/// Extracts entities from turns and maintains canonical entities per user.
pub struct EntityTracker {
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    cache: Arc<dyn CacheAdapter>,
    breakers: Arc<BreakerRegistry>,
    clock: Arc<dyn Clock>,
    parser: EntityParser,
    config: EntityConfig,
    cache_ttl: Duration,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl EntityTracker {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        cache: Arc<dyn CacheAdapter>,
        breakers: Arc<BreakerRegistry>,
        clock: Arc<dyn Clock>,
        config: EntityConfig,
        cache_ttl: Duration,
    ) -> Result<Self, MurmurError> {
        Ok(Self {
            storage,
            provider,
            cache,
            breakers,
            clock,
            parser: EntityParser::new()?,
            config,
            cache_ttl,
            user_locks: DashMap::new(),
        })
    }

    /// Ask the model for the entities mentioned in one exchange.
    ///
    /// Returns an empty list when the model is unavailable or its output
    /// cannot be parsed; the reason is logged.
    pub async fn extract_entities(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Vec<ExtractedEntity> {
        if user_text.trim().is_empty() && assistant_text.trim().is_empty() {
            return Vec::new();
        }
        let prompt = EXTRACTION_PROMPT
            .replace("{user}", user_text)
            .replace("{assistant}", assistant_text);
        let provider = Arc::clone(&self.provider);
        let options = GenerateOptions {
            temperature: Some(0.0),
            json: true,
            ..GenerateOptions::default()
        };
        let raw = self
            .breakers
            .get(Dependency::LlmGenerate)
            .call(async move { provider.generate(&prompt, &options).await })
            .await;

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = user_id, error = %e, "entity extraction call failed");
                return Vec::new();
            }
        };
        match self.parser.parse(&raw) {
            Ok(entities) => {
                debug!(user = user_id, count = entities.len(), "extracted entities");
                entities
            }
            Err(e) => {
                warn!(user = user_id, error = %e, "discarding unparseable entity output");
                Vec::new()
            }
        }
    }

    /// Resolve a mention to a canonical entity id, creating one if needed.
    pub async fn resolve(
        &self,
        user_id: &str,
        text: &str,
        entity_type: EntityType,
    ) -> Result<String, MurmurError> {
        self.resolve_mention(user_id, text, entity_type, 1.0).await
    }

    /// [`resolve`](Self::resolve) with the extraction confidence of the mention.
    pub async fn resolve_mention(
        &self,
        user_id: &str,
        text: &str,
        entity_type: EntityType,
        confidence: f64,
    ) -> Result<String, MurmurError> {
        let surface = text.trim();
        if surface.is_empty() {
            return Err(MurmurError::Validation("entity text is empty".into()));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let now = format_timestamp(self.clock.now());
        let candidates = self.candidates(user_id, entity_type).await?;
        let best = candidates
            .iter()
            .map(|e| (e, best_match_score(e, surface)))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.id.cmp(&a.0.id)));

        let id = match best {
            Some((entity, score)) if score >= self.config.resolution_threshold => {
                self.storage
                    .add_surface_form(&entity.id, surface, confidence, &now)
                    .await?;
                debug!(user = user_id, entity = %entity.id, score, "attached surface form");
                entity.id.clone()
            }
            _ => {
                let entity = Entity {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    entity_type,
                    canonical_name: surface.to_string(),
                    surface_forms: vec![surface.to_string()],
                    confidence,
                    first_seen_at: now.clone(),
                    last_seen_at: now,
                };
                self.storage.insert_entity(&entity).await?;
                info!(user = user_id, entity = %entity.id, %entity_type, name = surface, "new canonical entity");
                entity.id
            }
        };
        self.invalidate(user_id, entity_type).await;
        Ok(id)
    }

    /// Extract and resolve every entity of one exchange.
    ///
    /// Returns the canonical ids touched. Individual resolution failures are
    /// logged and skipped.
    pub async fn track_turn(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Vec<String> {
        let mut ids = Vec::new();
        for mention in self.extract_entities(user_id, user_text, assistant_text).await {
            match self
                .resolve_mention(user_id, &mention.text, mention.entity_type, mention.confidence)
                .await
            {
                Ok(id) => ids.push(id),
                Err(e) => warn!(user = user_id, text = %mention.text, error = %e, "entity resolution failed"),
            }
        }
        ids
    }

    pub async fn list_entities(
        &self,
        user_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>, MurmurError> {
        self.storage.list_entities(user_id, entity_type).await
    }

    /// Administrative hard delete.
    pub async fn delete_entity(&self, id: &str) -> Result<bool, MurmurError> {
        let entity = self.storage.get_entity(id).await?;
        let deleted = self.storage.delete_entity(id).await?;
        if let Some(entity) = entity {
            self.invalidate(&entity.user_id, entity.entity_type).await;
            info!(entity = id, user = %entity.user_id, "entity deleted");
        }
        Ok(deleted)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.user_locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn cache_key(user_id: &str, entity_type: EntityType) -> String {
        format!("entities:{user_id}:{entity_type}")
    }

    /// Canonical entities for a user and type, via the cache when possible.
    async fn candidates(
        &self,
        user_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, MurmurError> {
        let key = Self::cache_key(user_id, entity_type);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str(&cached) {
                Ok(entities) => return Ok(entities),
                Err(e) => debug!(key, error = %e, "ignoring corrupt cache entry"),
            },
            Ok(None) => {}
            Err(e) => debug!(key, error = %e, "entity cache read failed"),
        }

        let entities = self.storage.list_entities(user_id, Some(entity_type)).await?;
        if let Ok(json) = serde_json::to_string(&entities)
            && let Err(e) = self.cache.set(&key, json, self.cache_ttl).await
        {
            debug!(key, error = %e, "entity cache write failed");
        }
        Ok(entities)
    }

    async fn invalidate(&self, user_id: &str, entity_type: EntityType) {
        let key = Self::cache_key(user_id, entity_type);
        if let Err(e) = self.cache.delete(&key).await {
            debug!(key, error = %e, "entity cache delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_and_space() {
        assert_eq!(normalize_name("  Dr.   SMITH "), "dr. smith");
    }

    #[test]
    fn similarity_of_variants() {
        assert!(name_similarity("Dr. Smith", "dr smith") >= 0.8);
        assert!(name_similarity("Alice", "Bob") < 0.8);
        assert_eq!(name_similarity("Paris", " paris"), 1.0);
    }

    #[test]
    fn best_match_uses_surface_forms() {
        let entity = Entity {
            id: "e".into(),
            user_id: "u".into(),
            entity_type: EntityType::Person,
            canonical_name: "Robert Jones".into(),
            surface_forms: vec!["Robert Jones".into(), "Bobby".into()],
            confidence: 1.0,
            first_seen_at: String::new(),
            last_seen_at: String::new(),
        };
        assert_eq!(best_match_score(&entity, "bobby"), 1.0);
    }
}
