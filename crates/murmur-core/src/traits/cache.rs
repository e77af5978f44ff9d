// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value cache trait for ephemeral session and entity lookups.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MurmurError;
use crate::traits::adapter::PluginAdapter;

/// A TTL cache. Never a system of record: a miss must always be recoverable
/// from the relational store.
#[async_trait]
pub trait CacheAdapter: PluginAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, MurmurError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), MurmurError>;

    async fn delete(&self, key: &str) -> Result<(), MurmurError>;
}
