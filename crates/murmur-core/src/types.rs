// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by the store adapters, retriever, tracker, and orchestrator.
//!
//! Timestamps are ISO 8601 strings in UTC with millisecond precision (see
//! [`crate::time::format_timestamp`]) so that lexical order equals temporal
//! order in SQL comparisons.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter plugged into the core.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Transcription,
    Synthesis,
    Storage,
    VectorIndex,
    Cache,
}

// --- Sessions ---

/// Lifecycle state of a conversation session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    Closed,
}

/// A per-user conversation session. Never physically deleted, only closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub state: SessionState,
    pub started_at: String,
    pub last_activity_at: String,
    /// When the idle sweep last moved this session to idle.
    pub idled_at: Option<String>,
    pub closed_at: Option<String>,
    pub message_count: i64,
}

// --- Messages ---

/// Author of a recorded turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A raw recorded turn.
///
/// The message embedding, when present, lives in the vector index under the
/// message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
    pub importance_score: f64,
    pub consolidated_at: Option<String>,
    pub consolidated_summary_id: Option<String>,
}

// --- Persistent memories ---

/// Category of a persistent memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Schedule,
    Fact,
    Task,
    Preference,
    Reminder,
    Other,
}

impl MemoryCategory {
    /// Parse a category, mapping anything unrecognised to [`MemoryCategory::Other`].
    pub fn parse_lenient(s: &str) -> Self {
        s.trim().parse().unwrap_or(MemoryCategory::Other)
    }
}

/// A durable fact about the user. Soft-deleted via `active = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentMemory {
    pub id: String,
    pub user_id: String,
    pub category: MemoryCategory,
    pub content: String,
    /// 1..=10, clamped on the way in.
    pub importance: u8,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub created_at: String,
    pub active: bool,
}

/// Clamp an importance value into the 1..=10 range.
pub fn clamp_importance(value: i64) -> u8 {
    value.clamp(1, 10) as u8
}

// --- Entities ---

/// Kind of a named entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Place,
    Organization,
    Date,
    Time,
    Event,
    Other,
}

impl EntityType {
    /// Parse an entity type, mapping anything unrecognised to [`EntityType::Other`].
    pub fn parse_lenient(s: &str) -> Self {
        s.trim().parse().unwrap_or(EntityType::Other)
    }
}

/// A canonical entity aggregating every surface form seen for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub canonical_name: String,
    pub surface_forms: Vec<String>,
    pub confidence: f64,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

/// An entity mention returned by the extraction call, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
    pub context: String,
}

// --- Consolidation ---

/// An LLM-written summary replacing a chunk of aged raw messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMemory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub source_message_ids: Vec<String>,
    pub period_start: String,
    pub period_end: String,
    pub created_at: String,
}

/// Append-only audit row for one consolidation invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationRun {
    pub id: String,
    pub user_id: String,
    pub cutoff_date: String,
    pub messages_consolidated: i64,
    pub summaries_created: i64,
    pub tokens_saved_estimate: i64,
    pub run_at: String,
}

// --- Retrieval ---

/// Which corpus a retrievable item comes from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SnippetKind {
    Message,
    Summary,
}

/// A retrievable item with the score assigned by whichever ranking produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub id: String,
    pub kind: SnippetKind,
    pub content: String,
    pub session_id: Option<String>,
    pub created_at: String,
    pub score: f64,
}

// --- External adapter payloads ---

/// Options for a text generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the backend to constrain output to JSON when it supports it.
    pub json: bool,
}

/// Output of a speech-to-text call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub confidence: f64,
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub user_id: String,
    pub kind: SnippetKind,
}

/// Restricts a vector query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorFilter {
    pub user_id: Option<String>,
}

/// A single vector query result.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub similarity: f32,
}
