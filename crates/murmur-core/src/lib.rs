// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Murmur conversational memory core.
//!
//! This crate provides the error taxonomy, the shared data model, the clock
//! abstraction, and the adapter traits for every external collaborator
//! (LLM, speech, relational store, vector index, cache).

pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::MurmurError;
pub use time::{Clock, ManualClock, SystemClock};
pub use types::{AdapterType, HealthStatus};

pub use traits::{
    CacheAdapter, EmbeddingAdapter, PluginAdapter, ProviderAdapter, StorageAdapter,
    SynthesisAdapter, TranscriptionAdapter, VectorIndex,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_display_round_trip() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Provider,
            AdapterType::Embedding,
            AdapterType::Transcription,
            AdapterType::Synthesis,
            AdapterType::Storage,
            AdapterType::VectorIndex,
            AdapterType::Cache,
        ];
        for variant in &variants {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn health_status_serializes_with_detail() {
        let json = serde_json::to_string(&HealthStatus::Degraded("slow".into())).unwrap();
        assert_eq!(json, r#"{"status":"degraded","detail":"slow"}"#);
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _provider(_: &dyn ProviderAdapter) {}
        fn _embedding(_: &dyn EmbeddingAdapter) {}
        fn _storage(_: &dyn StorageAdapter) {}
        fn _vector(_: &dyn VectorIndex) {}
        fn _cache(_: &dyn CacheAdapter) {}
        fn _stt(_: &dyn TranscriptionAdapter) {}
        fn _tts(_: &dyn SynthesisAdapter) {}
    }
}
