// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory subsystems for the Murmur core.
//!
//! - **HybridRetriever**: vector + BM25 search fused with weighted RRF
//! - **EntityTracker**: LLM entity extraction and canonical resolution
//! - **FactExtractor**: LLM fact extraction into persistent memories
//! - **Consolidator**: summarization of aged raw history
//! - **parse**: schema-validated parsing of model output

pub mod consolidator;
pub mod entity;
pub mod extractor;
pub mod parse;
pub mod retriever;

pub use consolidator::{Consolidator, TokenEstimator};
pub use entity::EntityTracker;
pub use extractor::FactExtractor;
pub use parse::ExtractedFact;
pub use retriever::{FusionWeights, HybridRetriever, Retrieval, fuse};
