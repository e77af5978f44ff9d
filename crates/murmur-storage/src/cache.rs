// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process TTL cache.
//!
//! Entries expire lazily on read; [`InMemoryCache::purge_expired`] drops
//! stale entries in bulk and is called by the idle sweeper.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use murmur_core::{AdapterType, CacheAdapter, HealthStatus, MurmurError, PluginAdapter};

#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for InMemoryCache {
    fn name(&self) -> &str {
        "memory-cache"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Cache
    }

    async fn health_check(&self) -> Result<HealthStatus, MurmurError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MurmurError> {
        self.entries.clear();
        Ok(())
    }
}

#[async_trait]
impl CacheAdapter for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, MurmurError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.0.clone(), entry.1 > now));
        match hit {
            Some((value, true)) => Ok(Some(value)),
            Some((_, false)) => {
                self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), MurmurError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MurmurError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v".into(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_stale_entries() {
        let cache = InMemoryCache::new();
        cache.set("short", "a".into(), Duration::from_secs(1)).await.unwrap();
        cache.set("long", "b".into(), Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
