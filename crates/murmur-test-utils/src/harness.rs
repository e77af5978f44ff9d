// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness assembling every collaborator the memory core needs.
//!
//! `TestHarness` owns a temp SQLite database (relational store and vector
//! index), an in-process cache, mock LLM and speech adapters, a manual
//! clock, and a breaker registry built from the harness configuration.
//! Component constructors take the trait-object accessors.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use murmur_config::model::MurmurConfig;
use murmur_core::{
    CacheAdapter, Clock, EmbeddingAdapter, ManualClock, MurmurError, ProviderAdapter,
    StorageAdapter, SynthesisAdapter, TranscriptionAdapter, VectorIndex,
};
use murmur_resilience::BreakerRegistry;
use murmur_storage::{InMemoryCache, SqliteStorage, SqliteVectorIndex};

use crate::mock_provider::{MockEmbedder, MockProvider, MockSynthesizer, MockTranscriber};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: MurmurConfig,
    start: DateTime<Utc>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            config: MurmurConfig::default(),
            start: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().unwrap_or_default(),
        }
    }

    /// Queue mock provider responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Adjust the configuration before components are built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut MurmurConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Start the manual clock at `start`.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Build the harness, creating and migrating the temp database.
    pub async fn build(mut self) -> Result<TestHarness, MurmurError> {
        let temp_dir = tempfile::TempDir::new().map_err(MurmurError::storage)?;
        self.config.storage.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let sqlite = SqliteStorage::new(self.config.storage.clone());
        sqlite.initialize().await?;
        let vector_index = Arc::new(SqliteVectorIndex::new(sqlite.database()?.clone()));
        let sqlite = Arc::new(sqlite);

        Ok(TestHarness {
            breakers: Arc::new(BreakerRegistry::from_config(&self.config.breaker)),
            sqlite,
            vector_index,
            memory_cache: Arc::new(InMemoryCache::new()),
            mock_provider: Arc::new(MockProvider::with_responses(self.responses)),
            mock_embedder: Arc::new(MockEmbedder::default()),
            mock_transcriber: Arc::new(MockTranscriber::new()),
            mock_synthesizer: Arc::new(MockSynthesizer::new()),
            manual_clock: Arc::new(ManualClock::new(self.start)),
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete set of collaborators backed by mocks and a temp database.
pub struct TestHarness {
    pub config: MurmurConfig,
    pub sqlite: Arc<SqliteStorage>,
    pub vector_index: Arc<SqliteVectorIndex>,
    pub memory_cache: Arc<InMemoryCache>,
    pub mock_provider: Arc<MockProvider>,
    pub mock_embedder: Arc<MockEmbedder>,
    pub mock_transcriber: Arc<MockTranscriber>,
    pub mock_synthesizer: Arc<MockSynthesizer>,
    pub manual_clock: Arc<ManualClock>,
    pub breakers: Arc<BreakerRegistry>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default configuration.
    pub async fn new() -> Result<Self, MurmurError> {
        Self::builder().build().await
    }

    pub fn storage(&self) -> Arc<dyn StorageAdapter> {
        self.sqlite.clone()
    }

    pub fn vectors(&self) -> Arc<dyn VectorIndex> {
        self.vector_index.clone()
    }

    pub fn cache(&self) -> Arc<dyn CacheAdapter> {
        self.memory_cache.clone()
    }

    pub fn provider(&self) -> Arc<dyn ProviderAdapter> {
        self.mock_provider.clone()
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingAdapter> {
        self.mock_embedder.clone()
    }

    pub fn transcriber(&self) -> Arc<dyn TranscriptionAdapter> {
        self.mock_transcriber.clone()
    }

    pub fn synthesizer(&self) -> Arc<dyn SynthesisAdapter> {
        self.mock_synthesizer.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.manual_clock.clone()
    }

    /// Move the manual clock forward.
    pub fn advance_minutes(&self, minutes: i64) {
        self.manual_clock.advance(chrono::Duration::minutes(minutes));
    }

    pub fn advance_days(&self, days: i64) {
        self.manual_clock.advance(chrono::Duration::days(days));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_builds_with_working_store() {
        let harness = TestHarness::new().await.unwrap();
        harness.storage().ping().await.unwrap();
        assert_eq!(harness.storage().count_active_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clock_moves_only_when_advanced() {
        let harness = TestHarness::new().await.unwrap();
        let start = harness.clock().now();
        harness.advance_minutes(35);
        assert_eq!(harness.clock().now() - start, chrono::Duration::minutes(35));
    }
}
