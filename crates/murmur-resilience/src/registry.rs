// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The set of breakers owned by the orchestrator, one per dependency.

use std::sync::Arc;

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use murmur_config::model::{BreakerConfig, BreakersConfig};

use crate::breaker::{BreakerSettings, CircuitBreaker, CircuitSnapshot};

/// External dependencies guarded by a breaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Stt,
    Tts,
    LlmGenerate,
    LlmEmbed,
    Db,
}

/// Independently configured breakers for every [`Dependency`].
///
/// Created once at startup and shared by reference; there is no global
/// breaker state.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    stt: Arc<CircuitBreaker>,
    tts: Arc<CircuitBreaker>,
    llm_generate: Arc<CircuitBreaker>,
    llm_embed: Arc<CircuitBreaker>,
    db: Arc<CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn from_config(config: &BreakersConfig) -> Self {
        let make = |dep: Dependency, cfg: &BreakerConfig| {
            Arc::new(CircuitBreaker::new(dep.to_string(), BreakerSettings::from(cfg)))
        };
        Self {
            stt: make(Dependency::Stt, &config.stt),
            tts: make(Dependency::Tts, &config.tts),
            llm_generate: make(Dependency::LlmGenerate, &config.llm_generate),
            llm_embed: make(Dependency::LlmEmbed, &config.llm_embed),
            db: make(Dependency::Db, &config.db),
        }
    }

    pub fn get(&self, dependency: Dependency) -> &Arc<CircuitBreaker> {
        match dependency {
            Dependency::Stt => &self.stt,
            Dependency::Tts => &self.tts,
            Dependency::LlmGenerate => &self.llm_generate,
            Dependency::LlmEmbed => &self.llm_embed,
            Dependency::Db => &self.db,
        }
    }

    /// Snapshots of every breaker, in declaration order.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        Dependency::iter().map(|d| self.get(d).snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[test]
    fn db_breaker_uses_its_own_thresholds() {
        let registry = BreakerRegistry::from_config(&BreakersConfig::default());
        assert_eq!(registry.get(Dependency::Db).settings().failure_threshold, 3);
        assert_eq!(
            registry.get(Dependency::LlmEmbed).settings().failure_threshold,
            5
        );
        assert_eq!(registry.get(Dependency::LlmGenerate).name(), "llm_generate");
    }

    #[test]
    fn snapshot_lists_every_dependency_closed() {
        let registry = BreakerRegistry::from_config(&BreakersConfig::default());
        let snap = registry.snapshot();
        let names: Vec<_> = snap.iter().map(|s| s.dependency.as_str()).collect();
        assert_eq!(names, ["stt", "tts", "llm_generate", "llm_embed", "db"]);
        assert!(snap.iter().all(|s| s.state == CircuitState::Closed));
    }
}
