// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational system of record.

use async_trait::async_trait;

use crate::error::MurmurError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ConsolidatedMemory, ConsolidationRun, Entity, EntityType, MemorySnippet, Message,
    PersistentMemory, Session,
};

/// Adapter for the relational store holding sessions, messages, persistent
/// memories, entities, and consolidation history.
///
/// Every method is one short transaction. Conditional updates report whether
/// they matched a row so callers can detect races without holding locks.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), MurmurError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), MurmurError>;

    /// Cheap round-trip used by the status surface.
    async fn ping(&self) -> Result<(), MurmurError>;

    // --- Sessions ---

    async fn create_session(&self, session: &Session) -> Result<(), MurmurError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, MurmurError>;

    async fn get_active_session_for_user(&self, user_id: &str)
    -> Result<Option<Session>, MurmurError>;

    /// The idle session for `user_id` that went idle most recently.
    async fn get_latest_idle_session_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Session>, MurmurError>;

    /// Bumps `last_activity_at` only if the session is still active.
    async fn touch_active_session(&self, id: &str, at: &str) -> Result<bool, MurmurError>;

    /// Moves an idle session back to active. Returns false if it was not idle.
    async fn reactivate_session(&self, id: &str, at: &str) -> Result<bool, MurmurError>;

    /// Marks every active session with `last_activity_at < cutoff` idle and
    /// returns the sessions that changed.
    async fn mark_idle_sessions(&self, cutoff: &str, at: &str)
    -> Result<Vec<Session>, MurmurError>;

    /// Closes a non-closed session. Returns false if it was already closed.
    async fn close_session(&self, id: &str, at: &str) -> Result<bool, MurmurError>;

    async fn count_active_sessions(&self) -> Result<i64, MurmurError>;

    // --- Messages ---

    /// Inserts the message and bumps its session's counters atomically,
    /// resuming the session if it is idle. Appending an id already stored
    /// for the same session is a no-op success. Fails with `NotFound` if the
    /// session is missing or closed.
    async fn append_message(&self, message: &Message) -> Result<(), MurmurError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, MurmurError>;

    /// The last `limit` messages of a session, oldest first.
    async fn recent_messages(&self, session_id: &str, limit: usize)
    -> Result<Vec<Message>, MurmurError>;

    /// Unconsolidated messages for `user_id` created before `before`, oldest first.
    async fn eligible_for_consolidation(
        &self,
        user_id: &str,
        before: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MurmurError>;

    /// Users that have at least one message eligible for consolidation.
    async fn users_with_eligible_messages(&self, before: &str) -> Result<Vec<String>, MurmurError>;

    /// Full-text search over unconsolidated messages and summaries for a user,
    /// most relevant first.
    async fn keyword_search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MurmurError>;

    /// Loads retrievable items by id, skipping ids that are gone or consolidated.
    async fn get_snippets(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<MemorySnippet>, MurmurError>;

    // --- Persistent memories ---

    async fn insert_memory(&self, memory: &PersistentMemory) -> Result<(), MurmurError>;

    async fn get_memory(&self, id: &str) -> Result<Option<PersistentMemory>, MurmurError>;

    async fn list_active_memories(&self, user_id: &str)
    -> Result<Vec<PersistentMemory>, MurmurError>;

    /// Active memories ordered by `(importance DESC, created_at DESC)`.
    async fn top_memories(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<PersistentMemory>, MurmurError>;

    /// Soft delete. Returns false if the memory was already inactive.
    async fn deactivate_memory(&self, id: &str) -> Result<bool, MurmurError>;

    // --- Entities ---

    async fn list_entities(
        &self,
        user_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>, MurmurError>;

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>, MurmurError>;

    async fn insert_entity(&self, entity: &Entity) -> Result<(), MurmurError>;

    /// Records a surface form (no-op if already known) and bumps `last_seen_at`.
    async fn add_surface_form(
        &self,
        entity_id: &str,
        surface_form: &str,
        confidence: f64,
        at: &str,
    ) -> Result<(), MurmurError>;

    async fn delete_entity(&self, id: &str) -> Result<bool, MurmurError>;

    // --- Consolidation ---

    /// Stores the summary and marks its source messages consolidated in one
    /// transaction. Messages already consolidated are left alone; if none of
    /// them is still eligible the summary is not stored. Returns the number
    /// of messages marked.
    async fn commit_consolidation(
        &self,
        summary: &ConsolidatedMemory,
        at: &str,
    ) -> Result<usize, MurmurError>;

    async fn insert_consolidation_run(&self, run: &ConsolidationRun) -> Result<(), MurmurError>;

    async fn list_consolidation_runs(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConsolidationRun>, MurmurError>;
}
