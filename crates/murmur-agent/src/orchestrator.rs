// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory façade called by transports and the HTTP gateway.
//!
//! [`MemoryOrchestrator`] owns every stateful component (sessions, breakers,
//! retriever, entity tracker, fact extractor, consolidator, enrichment pool)
//! and is built once at startup from explicit [`Collaborators`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use murmur_config::model::MurmurConfig;
use murmur_core::time::{format_timestamp, new_id};
use murmur_core::types::{
    ConsolidationRun, Entity, EntityType, ExtractedEntity, MemoryCategory, MemorySnippet,
    Message, MessageRole, PersistentMemory, SessionState, Transcription, clamp_importance,
};
use murmur_core::{
    CacheAdapter, Clock, EmbeddingAdapter, MurmurError, ProviderAdapter, StorageAdapter,
    SynthesisAdapter, TranscriptionAdapter, VectorIndex,
};
use murmur_memory::{Consolidator, EntityTracker, FactExtractor, HybridRetriever, Retrieval};
use murmur_resilience::{
    BreakerRegistry, CircuitSnapshot, Dependency, RetryPolicy, retry_with_backoff,
};

use crate::enrichment::{EnrichmentJob, EnrichmentQueue, EnrichmentStats, Enricher};
use crate::session::{SessionManager, SessionOrigin};

/// External adapters the orchestrator is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageAdapter>,
    pub vectors: Arc<dyn VectorIndex>,
    pub cache: Arc<dyn CacheAdapter>,
    pub provider: Arc<dyn ProviderAdapter>,
    pub embedder: Arc<dyn EmbeddingAdapter>,
    pub transcriber: Option<Arc<dyn TranscriptionAdapter>>,
    pub synthesizer: Option<Arc<dyn SynthesisAdapter>>,
    pub clock: Arc<dyn Clock>,
}

/// Context gathered for one turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    /// Last raw turns of the session, oldest first.
    pub short_term: Vec<Message>,
    /// Fused retrieval results.
    pub long_term: Vec<MemorySnippet>,
    /// Known facts, most important first.
    pub facts: Vec<PersistentMemory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    pub session_id: String,
    pub session_origin: SessionOrigin,
    pub context: ContextBundle,
    /// Some source was skipped; the bundle is still usable.
    pub degraded: bool,
}

/// A manually entered persistent memory.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub user_id: String,
    pub category: String,
    pub content: String,
    pub importance: i64,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub reachable: bool,
    pub error: Option<String>,
}

/// Health and status surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub healthy: bool,
    pub store: StoreStatus,
    pub active_sessions: Option<i64>,
    pub breakers: Vec<CircuitSnapshot>,
    pub enrichment: EnrichmentStats,
}

pub struct MemoryOrchestrator {
    storage: Arc<dyn StorageAdapter>,
    transcriber: Option<Arc<dyn TranscriptionAdapter>>,
    synthesizer: Option<Arc<dyn SynthesisAdapter>>,
    clock: Arc<dyn Clock>,
    breakers: Arc<BreakerRegistry>,
    sessions: Arc<SessionManager>,
    retriever: HybridRetriever,
    entities: Arc<EntityTracker>,
    consolidator: Consolidator,
    enrichment: EnrichmentQueue,
    write_retry: RetryPolicy,
    config: MurmurConfig,
    cancel: CancellationToken,
}

impl MemoryOrchestrator {
    /// Build every component and start the enrichment workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(collab: Collaborators, config: MurmurConfig) -> Result<Self, MurmurError> {
        let breakers = Arc::new(BreakerRegistry::from_config(&config.breaker));
        Self::with_breakers(collab, config, breakers)
    }

    /// Like [`new`](Self::new) with a caller-owned breaker registry.
    pub fn with_breakers(
        collab: Collaborators,
        config: MurmurConfig,
        breakers: Arc<BreakerRegistry>,
    ) -> Result<Self, MurmurError> {
        let cancel = CancellationToken::new();
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.cache),
            Arc::clone(&collab.clock),
            config.session.clone(),
            Duration::from_secs(config.cache.session_ttl_secs),
        ));
        let retriever = HybridRetriever::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.vectors),
            Arc::clone(&collab.embedder),
            Arc::clone(&breakers),
            config.retrieval.clone(),
        );
        let entities = Arc::new(EntityTracker::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.provider),
            Arc::clone(&collab.cache),
            Arc::clone(&breakers),
            Arc::clone(&collab.clock),
            config.entity.clone(),
            Duration::from_secs(config.cache.entity_ttl_secs),
        )?);
        let facts = Arc::new(FactExtractor::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.provider),
            Arc::clone(&breakers),
            Arc::clone(&collab.clock),
            config.extraction.clone(),
        )?);
        let consolidator = Consolidator::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.vectors),
            Arc::clone(&collab.embedder),
            Arc::clone(&collab.provider),
            Arc::clone(&breakers),
            Arc::clone(&collab.clock),
            config.consolidation.clone(),
        );
        let enricher = Arc::new(Enricher::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.vectors),
            Arc::clone(&collab.embedder),
            Arc::clone(&breakers),
            Arc::clone(&entities),
            facts,
            config.entity.enabled,
        ));
        let enrichment = EnrichmentQueue::start(
            enricher,
            config.worker.workers,
            config.worker.queue_capacity,
            cancel.child_token(),
        );

        Ok(Self {
            storage: collab.storage,
            transcriber: collab.transcriber,
            synthesizer: collab.synthesizer,
            clock: collab.clock,
            breakers,
            sessions,
            retriever,
            entities,
            consolidator,
            enrichment,
            write_retry: RetryPolicy::from(&config.write_retry),
            config,
            cancel,
        })
    }

    pub fn config(&self) -> &MurmurConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Token cancelled by [`shutdown`](Self::shutdown); background loops watch it.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // --- Turns ---

    /// Resolve the session for a turn and gather its context.
    ///
    /// Only session resolution can fail; every context source degrades to
    /// empty on error.
    pub async fn handle_turn(
        &self,
        user_id: &str,
        session_hint: Option<&str>,
        user_text: &str,
    ) -> Result<TurnContext, MurmurError> {
        metrics::counter!("murmur_turns_total").increment(1);
        let sessions = Arc::clone(&self.sessions);
        let (owner, hint) = (user_id.to_string(), session_hint.map(str::to_string));
        let (session, origin) = self
            .breakers
            .get(Dependency::Db)
            .call(async move { sessions.resolve(&owner, hint.as_deref()).await })
            .await?;

        let (short_term, retrieval, facts) = tokio::join!(
            self.short_term(&session.id),
            self.retriever
                .retrieve(user_id, user_text, self.config.retrieval.limit),
            self.facts(user_id, self.config.retrieval.facts_limit),
        );

        let mut degraded = retrieval.degraded;
        let short_term = short_term.unwrap_or_else(|e| {
            degraded = true;
            warn!(session_id = %session.id, error = %e, "short-term history unavailable");
            Vec::new()
        });
        let facts = facts.unwrap_or_else(|e| {
            degraded = true;
            warn!(user = user_id, error = %e, "persistent memories unavailable");
            Vec::new()
        });

        debug!(
            user = user_id,
            session_id = %session.id,
            short_term = short_term.len(),
            long_term = retrieval.snippets.len(),
            facts = facts.len(),
            degraded,
            "turn context assembled"
        );
        Ok(TurnContext {
            session_id: session.id,
            session_origin: origin,
            context: ContextBundle {
                short_term,
                long_term: retrieval.snippets,
                facts,
            },
            degraded,
        })
    }

    /// Persist one turn and queue its enrichment.
    ///
    /// Writes are serialized per session and retried on transient store
    /// errors; a retried write never stores the turn twice. Writing to an
    /// idle session resumes it. Enrichment never affects the result.
    pub async fn record_turn(
        &self,
        session_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, MurmurError> {
        if text.trim().is_empty() {
            return Err(MurmurError::Validation("turn text is empty".into()));
        }
        let lock = self.sessions.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| MurmurError::not_found("session", session_id))?;
        if session.state == SessionState::Closed {
            return Err(MurmurError::Validation(format!(
                "session {session_id} is closed"
            )));
        }

        let message = Message {
            id: new_id(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            role,
            content: text.to_string(),
            created_at: format_timestamp(self.clock.now()),
            importance_score: 0.5,
            consolidated_at: None,
            consolidated_summary_id: None,
        };

        let breaker = self.breakers.get(Dependency::Db);
        retry_with_backoff(&self.write_retry, "append_message", || {
            let storage = Arc::clone(&self.storage);
            let message = message.clone();
            breaker.call(async move { storage.append_message(&message).await })
        })
        .await?;
        if session.state == SessionState::Idle {
            self.sessions.resumed(&session).await;
        }

        let job = EnrichmentJob {
            correlation_id: new_id(),
            message: message.clone(),
        };
        if self.enrichment.submit(job) {
            debug!(session_id, message_id = %message.id, %role, "turn recorded");
        }
        Ok(message)
    }

    // --- Sessions ---

    pub async fn close_session(&self, session_id: &str) -> Result<bool, MurmurError> {
        self.sessions.close_session(session_id).await
    }

    pub async fn sweep_idle(&self) -> Result<usize, MurmurError> {
        self.sessions.sweep_idle(self.config.session.timeout()).await
    }

    // --- Retrieval and memories ---

    pub async fn search(&self, user_id: &str, query: &str, limit: usize) -> Retrieval {
        self.retriever.retrieve(user_id, query, limit).await
    }

    pub async fn get_persistent_memories(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistentMemory>, MurmurError> {
        self.storage.top_memories(user_id, limit).await
    }

    /// Store a manually entered memory. Category and importance are clamped
    /// to valid values; empty content is rejected.
    pub async fn add_memory(&self, new: NewMemory) -> Result<PersistentMemory, MurmurError> {
        if new.user_id.trim().is_empty() {
            return Err(MurmurError::Validation("user id is empty".into()));
        }
        let content = new.content.trim();
        if content.is_empty() {
            return Err(MurmurError::Validation("memory content is empty".into()));
        }
        let memory = PersistentMemory {
            id: new_id(),
            user_id: new.user_id,
            category: MemoryCategory::parse_lenient(&new.category),
            content: content.to_string(),
            importance: clamp_importance(new.importance),
            tags: new
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            session_id: new.session_id,
            created_at: format_timestamp(self.clock.now()),
            active: true,
        };
        self.storage.insert_memory(&memory).await?;
        info!(user = %memory.user_id, memory_id = %memory.id, category = %memory.category, "memory added");
        Ok(memory)
    }

    /// Soft-delete a memory. Returns false if it was already inactive.
    pub async fn forget_memory(&self, id: &str) -> Result<bool, MurmurError> {
        if self.storage.get_memory(id).await?.is_none() {
            return Err(MurmurError::not_found("memory", id));
        }
        let changed = self.storage.deactivate_memory(id).await?;
        if changed {
            info!(memory_id = id, "memory forgotten");
        }
        Ok(changed)
    }

    // --- Entities ---

    pub async fn extract_entities(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Vec<ExtractedEntity> {
        self.entities
            .extract_entities(user_id, user_text, assistant_text)
            .await
    }

    pub async fn resolve_entity(
        &self,
        user_id: &str,
        text: &str,
        entity_type: EntityType,
    ) -> Result<String, MurmurError> {
        self.entities.resolve(user_id, text, entity_type).await
    }

    pub async fn list_entities(
        &self,
        user_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>, MurmurError> {
        self.entities.list_entities(user_id, entity_type).await
    }

    pub async fn delete_entity(&self, id: &str) -> Result<(), MurmurError> {
        if self.entities.delete_entity(id).await? {
            Ok(())
        } else {
            Err(MurmurError::not_found("entity", id))
        }
    }

    // --- Consolidation ---

    pub async fn run_consolidation(
        &self,
        user_id: Option<&str>,
        cutoff_days: Option<u32>,
    ) -> Result<Vec<ConsolidationRun>, MurmurError> {
        self.consolidator.run(user_id, cutoff_days).await
    }

    pub async fn list_consolidation_runs(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConsolidationRun>, MurmurError> {
        self.consolidator.list_runs(user_id, limit).await
    }

    // --- Speech pass-throughs ---

    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcription, MurmurError> {
        let transcriber = self
            .transcriber
            .clone()
            .ok_or_else(|| not_configured(Dependency::Stt))?;
        self.breakers
            .get(Dependency::Stt)
            .call(async move { transcriber.transcribe(&audio).await })
            .await
    }

    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, MurmurError> {
        let synthesizer = self
            .synthesizer
            .clone()
            .ok_or_else(|| not_configured(Dependency::Tts))?;
        let (text, voice_id) = (text.to_string(), voice_id.to_string());
        self.breakers
            .get(Dependency::Tts)
            .call(async move { synthesizer.synthesize(&text, &voice_id).await })
            .await
    }

    // --- Status and lifecycle ---

    pub async fn status(&self) -> StatusReport {
        let timeout = self.config.breaker.db.call_timeout();
        let ping = match tokio::time::timeout(timeout, self.storage.ping()).await {
            Ok(result) => result,
            Err(_) => Err(MurmurError::DependencyTimeout {
                dependency: Dependency::Db.to_string(),
                duration: timeout,
            }),
        };
        let store = match ping {
            Ok(()) => StoreStatus {
                reachable: true,
                error: None,
            },
            Err(e) => StoreStatus {
                reachable: false,
                error: Some(e.to_string()),
            },
        };
        let active_sessions = if store.reachable {
            self.storage.count_active_sessions().await.ok()
        } else {
            None
        };
        StatusReport {
            healthy: store.reachable,
            store,
            active_sessions,
            breakers: self.breakers.snapshot(),
            enrichment: self.enrichment.stats(),
        }
    }

    /// Wait until queued enrichment jobs are done.
    pub async fn wait_for_enrichment(&self) {
        self.enrichment.wait_idle().await;
    }

    /// Drain enrichment (bounded by `timeout`), stop background loops, and
    /// close the store.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), MurmurError> {
        info!("memory core shutting down");
        self.enrichment.shutdown(timeout).await;
        self.cancel.cancel();
        self.storage.close().await
    }

    async fn short_term(&self, session_id: &str) -> Result<Vec<Message>, MurmurError> {
        let storage = Arc::clone(&self.storage);
        let id = session_id.to_string();
        let limit = self.config.session.short_term_turns;
        self.breakers
            .get(Dependency::Db)
            .call(async move { storage.recent_messages(&id, limit).await })
            .await
    }

    async fn facts(&self, user_id: &str, limit: usize) -> Result<Vec<PersistentMemory>, MurmurError> {
        let storage = Arc::clone(&self.storage);
        let owner = user_id.to_string();
        self.breakers
            .get(Dependency::Db)
            .call(async move { storage.top_memories(&owner, limit).await })
            .await
    }
}

fn not_configured(dependency: Dependency) -> MurmurError {
    MurmurError::DependencyUnavailable {
        dependency: dependency.to_string(),
        message: "no adapter configured".into(),
    }
}
