// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the core consumes.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cache;
pub mod provider;
pub mod speech;
pub mod storage;
pub mod vector;

pub use adapter::PluginAdapter;
pub use cache::CacheAdapter;
pub use provider::{EmbeddingAdapter, ProviderAdapter};
pub use speech::{SynthesisAdapter, TranscriptionAdapter};
pub use storage::StorageAdapter;
pub use vector::VectorIndex;
