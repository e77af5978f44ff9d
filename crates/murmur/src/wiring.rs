// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds the production collaborators and the orchestrator over them.

use std::sync::Arc;

use tracing::{info, warn};

use murmur_agent::{Collaborators, MemoryOrchestrator};
use murmur_config::model::MurmurConfig;
use murmur_core::types::HealthStatus;
use murmur_core::{MurmurError, PluginAdapter, StorageAdapter, SystemClock};
use murmur_ollama::OllamaClient;
use murmur_storage::{InMemoryCache, SqliteStorage, SqliteVectorIndex};

/// Open the store, connect the LLM adapter, and assemble the core.
///
/// No speech adapters ship with the binary; transcription and synthesis
/// report the dependency as unavailable.
pub async fn build_core(config: &MurmurConfig) -> Result<Arc<MemoryOrchestrator>, MurmurError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let vectors = Arc::new(SqliteVectorIndex::new(storage.database()?.clone()));
    let storage = Arc::new(storage);
    info!(path = %config.storage.database_path, "store opened");

    let ollama = Arc::new(OllamaClient::new(&config.ollama)?);
    match ollama.health_check().await? {
        HealthStatus::Healthy => info!(url = ollama.base_url(), "ollama reachable"),
        HealthStatus::Degraded(detail) | HealthStatus::Unhealthy(detail) => {
            warn!(url = ollama.base_url(), detail = %detail, "ollama not healthy, calls will degrade");
        }
    }

    let collaborators = Collaborators {
        storage,
        vectors,
        cache: Arc::new(InMemoryCache::new()),
        provider: ollama.clone(),
        embedder: ollama,
        transcriber: None,
        synthesizer: None,
        clock: Arc::new(SystemClock),
    };
    Ok(Arc::new(MemoryOrchestrator::new(collaborators, config.clone())?))
}
