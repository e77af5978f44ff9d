// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM adapter traits: text generation and embeddings.

use async_trait::async_trait;

use crate::error::MurmurError;
use crate::traits::adapter::PluginAdapter;
use crate::types::GenerateOptions;

/// Adapter for text generation.
///
/// Implementations report raw failures as [`MurmurError::Provider`]; the
/// circuit breaker wrapping each call translates them for callers.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Generates a completion for `prompt`.
    async fn generate(&self, prompt: &str, options: &GenerateOptions)
    -> Result<String, MurmurError>;
}

/// Adapter for generating vector embeddings from text.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Returns the dimensionality of produced vectors.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MurmurError>;
}
