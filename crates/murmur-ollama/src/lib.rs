// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama adapter providing text generation and embeddings.
//!
//! [`OllamaClient`] talks to a local Ollama server over its native HTTP API.
//! It does not retry or time out on its own beyond a generous transport
//! limit: the circuit breakers in front of every call own those policies.
//! All failures surface as [`MurmurError::Provider`].

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use murmur_config::model::OllamaConfig;
use murmur_core::types::{AdapterType, GenerateOptions, HealthStatus};
use murmur_core::{EmbeddingAdapter, MurmurError, PluginAdapter, ProviderAdapter};

use crate::types::{
    ApiError, EmbedRequest, EmbedResponse, GenerateParams, GenerateRequest, GenerateResponse,
};

/// Transport-level ceiling; breaker call timeouts are tighter.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for a single Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    generate_model: String,
    embed_model: String,
    dimensions: usize,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, MurmurError> {
        let client = reqwest::Client::builder()
            .timeout(TRANSPORT_TIMEOUT)
            .build()
            .map_err(|e| MurmurError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            generate_model: config.generate_model.clone(),
            embed_model: config.embed_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    async fn post_json<B, R>(&self, route: &str, body: &B) -> Result<R, MurmurError>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(route))
            .json(body)
            .send()
            .await
            .map_err(|e| MurmurError::Provider {
                message: format!("Ollama not reachable at {}: {e}", self.base_url),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| MurmurError::Provider {
            message: format!("failed to read Ollama response: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(route, status = %status, bytes = text.len(), "ollama response");

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(MurmurError::Provider {
                message: format!("Ollama {route} returned {status}: {detail}"),
                source: None,
            });
        }
        serde_json::from_str(&text).map_err(|e| MurmurError::Provider {
            message: format!("unexpected Ollama {route} response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl PluginAdapter for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, MurmurError> {
        match self.client.get(self.url("/api/tags")).send().await {
            Ok(resp) if resp.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(resp) => Ok(HealthStatus::Degraded(format!(
                "Ollama answered {}",
                resp.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("Ollama unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), MurmurError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, MurmurError> {
        let request = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: false,
            system: options.system.as_deref(),
            format: options.json.then_some("json"),
            options: GenerateParams {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let response: GenerateResponse = self.post_json("/api/generate", &request).await?;
        if !response.done {
            debug!("ollama reported an unfinished generation");
        }
        Ok(response.response)
    }
}

#[async_trait]
impl EmbeddingAdapter for OllamaClient {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MurmurError> {
        let request = EmbedRequest {
            model: &self.embed_model,
            input: text,
        };
        let response: EmbedResponse = self.post_json("/api/embed", &request).await?;
        let vector = response.into_first().ok_or_else(|| MurmurError::Provider {
            message: "Ollama returned no embedding".into(),
            source: None,
        })?;
        if vector.len() != self.dimensions {
            return Err(MurmurError::Provider {
                message: format!(
                    "embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.dimensions
                ),
                source: None,
            });
        }
        Ok(vector)
    }
}
