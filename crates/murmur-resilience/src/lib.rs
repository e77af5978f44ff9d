// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for calls to external dependencies.
//!
//! Provides a per-dependency [`CircuitBreaker`], the [`BreakerRegistry`]
//! holding one breaker for each of speech-to-text, text-to-speech, LLM
//! generation, LLM embedding, and the relational store, and bounded
//! exponential backoff for write-side retries.

pub mod breaker;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerSettings, CircuitBreaker, CircuitSnapshot, CircuitState};
pub use registry::{BreakerRegistry, Dependency};
pub use retry::{RetryPolicy, retry_with_backoff};
