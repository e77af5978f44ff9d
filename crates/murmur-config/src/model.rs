// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Murmur memory core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Murmur configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MurmurConfig {
    /// Process identity and log level.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Relational store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-dependency circuit breaker settings.
    #[serde(default)]
    pub breaker: BreakersConfig,

    /// Hybrid retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Entity resolution settings.
    #[serde(default)]
    pub entity: EntityConfig,

    /// Fact extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Background consolidation settings.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Enrichment worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Write-side retry policy for the relational store.
    #[serde(default)]
    pub write_retry: RetryConfig,

    /// Cache TTLs.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Ollama LLM backend settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Name used in logs and status output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Default tracing level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "murmur".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("murmur").join("murmur.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("murmur.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Inactivity after which the sweep moves a session to idle.
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,

    /// How long after going idle a session may still be reactivated.
    #[serde(default = "default_reactivation_window_secs")]
    pub reactivation_window_secs: u64,

    /// Interval between idle sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Number of raw turns returned as short-term context.
    #[serde(default = "default_short_term_turns")]
    pub short_term_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout_secs(),
            reactivation_window_secs: default_reactivation_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            short_term_turns: default_short_term_turns(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reactivation_window(&self) -> Duration {
        Duration::from_secs(self.reactivation_window_secs)
    }
}

fn default_session_timeout_secs() -> u64 {
    30 * 60
}

fn default_reactivation_window_secs() -> u64 {
    10 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_short_term_turns() -> usize {
    10
}

/// Settings for a single circuit breaker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before allowing a trial call.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Per-call timeout; expiry counts as a failure.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl BreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_secs() -> u64 {
    60
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

/// Circuit breakers, one per external dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakersConfig {
    #[serde(default = "default_stt_breaker")]
    pub stt: BreakerConfig,

    #[serde(default = "default_tts_breaker")]
    pub tts: BreakerConfig,

    #[serde(default = "default_llm_generate_breaker")]
    pub llm_generate: BreakerConfig,

    #[serde(default = "default_llm_embed_breaker")]
    pub llm_embed: BreakerConfig,

    /// The relational store trips sooner and recovers sooner.
    #[serde(default = "default_db_breaker")]
    pub db: BreakerConfig,
}

impl Default for BreakersConfig {
    fn default() -> Self {
        Self {
            stt: default_stt_breaker(),
            tts: default_tts_breaker(),
            llm_generate: default_llm_generate_breaker(),
            llm_embed: default_llm_embed_breaker(),
            db: default_db_breaker(),
        }
    }
}

fn default_stt_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout_ms: 15_000,
        ..BreakerConfig::default()
    }
}

fn default_tts_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout_ms: 15_000,
        ..BreakerConfig::default()
    }
}

fn default_llm_generate_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout_ms: 30_000,
        ..BreakerConfig::default()
    }
}

fn default_llm_embed_breaker() -> BreakerConfig {
    BreakerConfig {
        call_timeout_ms: 5_000,
        ..BreakerConfig::default()
    }
}

fn default_db_breaker() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 3,
        open_timeout_secs: 30,
        call_timeout_ms: 2_000,
    }
}

/// Hybrid retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a semantic hit.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Weight of the semantic list in rank fusion.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,

    /// Weight of the keyword list in rank fusion.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,

    /// Rank damping constant `k` for reciprocal rank fusion.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Default number of fused results returned.
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Candidates fetched from each list before fusion.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Persistent memories surfaced as known facts.
    #[serde(default = "default_facts_limit")]
    pub facts_limit: usize,

    /// Upper bound on the whole retrieval step of a turn.
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            rrf_k: default_rrf_k(),
            limit: default_retrieval_limit(),
            candidate_limit: default_candidate_limit(),
            facts_limit: default_facts_limit(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_semantic_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_retrieval_limit() -> usize {
    10
}

fn default_candidate_limit() -> usize {
    50
}

fn default_facts_limit() -> usize {
    10
}

fn default_retrieval_timeout_ms() -> u64 {
    3_000
}

/// Entity resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Minimum normalized similarity to attach a mention to an existing entity.
    #[serde(default = "default_resolution_threshold")]
    pub resolution_threshold: f64,

    /// Whether entity extraction runs after each turn.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            resolution_threshold: default_resolution_threshold(),
            enabled: true,
        }
    }
}

fn default_resolution_threshold() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

/// Fact extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Whether fact extraction runs after each assistant turn.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Similarity at or above which a new fact duplicates an existing memory.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

fn default_dedup_threshold() -> f64 {
    0.9
}

/// Background consolidation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolidationConfig {
    /// Whether the scheduler runs consolidation automatically.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between scheduled runs.
    #[serde(default = "default_consolidation_interval_secs")]
    pub interval_secs: u64,

    /// Messages older than this many days are eligible.
    #[serde(default = "default_cutoff_days")]
    pub cutoff_days: u32,

    /// Smallest chunk worth summarizing.
    #[serde(default = "default_chunk_min")]
    pub chunk_min: usize,

    /// Largest chunk handed to a single summary call.
    #[serde(default = "default_chunk_max")]
    pub chunk_max: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_consolidation_interval_secs(),
            cutoff_days: default_cutoff_days(),
            chunk_min: default_chunk_min(),
            chunk_max: default_chunk_max(),
        }
    }
}

fn default_consolidation_interval_secs() -> u64 {
    3600
}

fn default_cutoff_days() -> u32 {
    7
}

fn default_chunk_min() -> usize {
    10
}

fn default_chunk_max() -> usize {
    20
}

/// Enrichment worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent enrichment workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs buffered before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on a single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

/// Cache TTL configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default = "default_entity_ttl_secs")]
    pub entity_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            entity_ttl_secs: default_entity_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_entity_ttl_secs() -> u64 {
    300
}

/// Ollama LLM backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Model used for summaries and structured extraction.
    #[serde(default = "default_generate_model")]
    pub generate_model: String,

    /// Model used for embeddings.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// Dimensionality of `embed_model` output.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            generate_model: default_generate_model(),
            embed_model: default_embed_model(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_generate_model() -> String {
    "llama3.2".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_dimensions() -> usize {
    768
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Required when the gateway is enabled.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3100
}
