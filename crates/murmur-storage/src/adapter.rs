// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use murmur_config::model::StorageConfig;
use murmur_core::types::{
    ConsolidatedMemory, ConsolidationRun, Entity, EntityType, MemorySnippet, Message,
    PersistentMemory, Session,
};
use murmur_core::{AdapterType, HealthStatus, MurmurError, PluginAdapter, StorageAdapter};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The underlying database, shared with the vector index.
    pub fn database(&self) -> Result<&Database, MurmurError> {
        self.db.get().ok_or_else(|| MurmurError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MurmurError> {
        match self.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MurmurError> {
        if self.db.get().is_some() {
            self.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), MurmurError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MurmurError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MurmurError> {
        if self.config.wal_mode {
            self.database()?.checkpoint().await?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), MurmurError> {
        self.database()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }

    // --- Sessions ---

    async fn create_session(&self, session: &Session) -> Result<(), MurmurError> {
        queries::sessions::create_session(self.database()?, session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, MurmurError> {
        queries::sessions::get_session(self.database()?, id).await
    }

    async fn get_active_session_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Session>, MurmurError> {
        queries::sessions::get_active_session_for_user(self.database()?, user_id).await
    }

    async fn get_latest_idle_session_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Session>, MurmurError> {
        queries::sessions::get_latest_idle_session_for_user(self.database()?, user_id).await
    }

    async fn touch_active_session(&self, id: &str, at: &str) -> Result<bool, MurmurError> {
        queries::sessions::touch_active_session(self.database()?, id, at).await
    }

    async fn reactivate_session(&self, id: &str, at: &str) -> Result<bool, MurmurError> {
        queries::sessions::reactivate_session(self.database()?, id, at).await
    }

    async fn mark_idle_sessions(
        &self,
        cutoff: &str,
        at: &str,
    ) -> Result<Vec<Session>, MurmurError> {
        queries::sessions::mark_idle_sessions(self.database()?, cutoff, at).await
    }

    async fn close_session(&self, id: &str, at: &str) -> Result<bool, MurmurError> {
        queries::sessions::close_session(self.database()?, id, at).await
    }

    async fn count_active_sessions(&self) -> Result<i64, MurmurError> {
        queries::sessions::count_active_sessions(self.database()?).await
    }

    // --- Messages ---

    async fn append_message(&self, message: &Message) -> Result<(), MurmurError> {
        queries::messages::append_message(self.database()?, message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, MurmurError> {
        queries::messages::get_message(self.database()?, id).await
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MurmurError> {
        queries::messages::recent_messages(self.database()?, session_id, limit).await
    }

    async fn eligible_for_consolidation(
        &self,
        user_id: &str,
        before: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MurmurError> {
        queries::messages::eligible_for_consolidation(self.database()?, user_id, before, limit)
            .await
    }

    async fn users_with_eligible_messages(&self, before: &str) -> Result<Vec<String>, MurmurError> {
        queries::messages::users_with_eligible_messages(self.database()?, before).await
    }

    async fn keyword_search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MurmurError> {
        queries::messages::keyword_search(self.database()?, user_id, query, limit).await
    }

    async fn get_snippets(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<MemorySnippet>, MurmurError> {
        queries::messages::get_snippets(self.database()?, user_id, ids).await
    }

    // --- Persistent memories ---

    async fn insert_memory(&self, memory: &PersistentMemory) -> Result<(), MurmurError> {
        queries::memories::insert_memory(self.database()?, memory).await
    }

    async fn get_memory(&self, id: &str) -> Result<Option<PersistentMemory>, MurmurError> {
        queries::memories::get_memory(self.database()?, id).await
    }

    async fn list_active_memories(
        &self,
        user_id: &str,
    ) -> Result<Vec<PersistentMemory>, MurmurError> {
        queries::memories::list_active_memories(self.database()?, user_id).await
    }

    async fn top_memories(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistentMemory>, MurmurError> {
        queries::memories::top_memories(self.database()?, user_id, limit).await
    }

    async fn deactivate_memory(&self, id: &str) -> Result<bool, MurmurError> {
        queries::memories::deactivate_memory(self.database()?, id).await
    }

    // --- Entities ---

    async fn list_entities(
        &self,
        user_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>, MurmurError> {
        queries::entities::list_entities(self.database()?, user_id, entity_type).await
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, MurmurError> {
        queries::entities::get_entity(self.database()?, id).await
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<(), MurmurError> {
        queries::entities::insert_entity(self.database()?, entity).await
    }

    async fn add_surface_form(
        &self,
        entity_id: &str,
        surface_form: &str,
        confidence: f64,
        at: &str,
    ) -> Result<(), MurmurError> {
        queries::entities::add_surface_form(self.database()?, entity_id, surface_form, confidence, at)
            .await
    }

    async fn delete_entity(&self, id: &str) -> Result<bool, MurmurError> {
        queries::entities::delete_entity(self.database()?, id).await
    }

    // --- Consolidation ---

    async fn commit_consolidation(
        &self,
        summary: &ConsolidatedMemory,
        at: &str,
    ) -> Result<usize, MurmurError> {
        queries::consolidation::commit_consolidation(self.database()?, summary, at).await
    }

    async fn insert_consolidation_run(&self, run: &ConsolidationRun) -> Result<(), MurmurError> {
        queries::consolidation::insert_consolidation_run(self.database()?, run).await
    }

    async fn list_consolidation_runs(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConsolidationRun>, MurmurError> {
        queries::consolidation::list_consolidation_runs(self.database()?, user_id, limit).await
    }
}
