// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Murmur memory core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, FTS5 keyword search, an exact
//! cosine vector index sharing the same database, and an in-process TTL
//! cache.

pub mod adapter;
pub mod cache;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod vector;

pub use adapter::SqliteStorage;
pub use cache::InMemoryCache;
pub use database::Database;
pub use vector::SqliteVectorIndex;
