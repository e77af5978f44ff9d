// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Murmur integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Mock text generator with prompt rules and fault injection
//! - [`MockEmbedder`] - Deterministic bag-of-words embedder
//! - [`TestHarness`] - Temp SQLite store, cache, mocks, and a manual clock

pub mod harness;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockEmbedder, MockProvider, MockSynthesizer, MockTranscriber};
