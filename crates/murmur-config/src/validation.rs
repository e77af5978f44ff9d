// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks ranges and cross-field constraints that serde attributes cannot
//! express. All errors are collected; validation does not fail fast.

use crate::diagnostic::ConfigError;
use crate::model::{BreakerConfig, MurmurConfig};

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &MurmurConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.session.timeout_secs == 0 {
        errors.push(out_of_range("session.timeout_secs", 0, "a positive number of seconds"));
    }
    if config.session.sweep_interval_secs == 0 {
        errors.push(out_of_range(
            "session.sweep_interval_secs",
            0,
            "a positive number of seconds",
        ));
    }

    let breakers = [
        ("stt", &config.breaker.stt),
        ("tts", &config.breaker.tts),
        ("llm_generate", &config.breaker.llm_generate),
        ("llm_embed", &config.breaker.llm_embed),
        ("db", &config.breaker.db),
    ];
    for (name, breaker) in breakers {
        validate_breaker(name, breaker, &mut errors);
    }

    let r = &config.retrieval;
    if !(0.0..=1.0).contains(&r.similarity_threshold) {
        errors.push(out_of_range(
            "retrieval.similarity_threshold",
            r.similarity_threshold,
            "a value between 0.0 and 1.0",
        ));
    }
    if r.semantic_weight < 0.0 {
        errors.push(out_of_range(
            "retrieval.semantic_weight",
            r.semantic_weight,
            "a non-negative weight",
        ));
    }
    if r.keyword_weight < 0.0 {
        errors.push(out_of_range(
            "retrieval.keyword_weight",
            r.keyword_weight,
            "a non-negative weight",
        ));
    }
    if r.semantic_weight + r.keyword_weight <= 0.0 {
        errors.push(ConfigError::Validation {
            message: "retrieval.semantic_weight and retrieval.keyword_weight must not both be zero"
                .to_string(),
        });
    }
    if r.rrf_k < 0.0 {
        errors.push(out_of_range("retrieval.rrf_k", r.rrf_k, "a non-negative constant"));
    }
    if r.limit == 0 {
        errors.push(out_of_range("retrieval.limit", 0, "at least 1"));
    }
    if r.candidate_limit < r.limit {
        errors.push(ConfigError::Validation {
            message: format!(
                "retrieval.candidate_limit ({}) must be at least retrieval.limit ({})",
                r.candidate_limit, r.limit
            ),
        });
    }

    if !(0.0..=1.0).contains(&config.entity.resolution_threshold) {
        errors.push(out_of_range(
            "entity.resolution_threshold",
            config.entity.resolution_threshold,
            "a value between 0.0 and 1.0",
        ));
    }
    if !(0.0..=1.0).contains(&config.extraction.dedup_threshold) {
        errors.push(out_of_range(
            "extraction.dedup_threshold",
            config.extraction.dedup_threshold,
            "a value between 0.0 and 1.0",
        ));
    }

    let c = &config.consolidation;
    if c.chunk_min == 0 {
        errors.push(out_of_range("consolidation.chunk_min", 0, "at least 1"));
    }
    if c.chunk_min > c.chunk_max {
        errors.push(ConfigError::Validation {
            message: format!(
                "consolidation.chunk_min ({}) must not exceed consolidation.chunk_max ({})",
                c.chunk_min, c.chunk_max
            ),
        });
    }
    if c.interval_secs == 0 {
        errors.push(out_of_range(
            "consolidation.interval_secs",
            0,
            "a positive number of seconds",
        ));
    }

    if config.worker.workers == 0 {
        errors.push(out_of_range("worker.workers", 0, "at least 1"));
    }
    if config.worker.queue_capacity == 0 {
        errors.push(out_of_range("worker.queue_capacity", 0, "at least 1"));
    }
    if config.write_retry.max_attempts == 0 {
        errors.push(out_of_range("write_retry.max_attempts", 0, "at least 1"));
    }

    if config.gateway.enabled
        && config
            .gateway
            .bearer_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::Validation {
            message: "gateway.bearer_token is required when gateway.enabled = true".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_breaker(name: &str, breaker: &BreakerConfig, errors: &mut Vec<ConfigError>) {
    if breaker.failure_threshold == 0 {
        errors.push(out_of_range(
            &format!("breaker.{name}.failure_threshold"),
            0,
            "at least 1",
        ));
    }
    if breaker.call_timeout_ms == 0 {
        errors.push(out_of_range(
            &format!("breaker.{name}.call_timeout_ms"),
            0,
            "a positive number of milliseconds",
        ));
    }
}

fn out_of_range(key: &str, value: impl std::fmt::Display, expected: &str) -> ConfigError {
    ConfigError::OutOfRange {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&MurmurConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = MurmurConfig::default();
        config.retrieval.similarity_threshold = 1.5;
        config.consolidation.chunk_min = 30;
        config.breaker.db.failure_threshold = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn enabled_gateway_needs_token() {
        let mut config = MurmurConfig::default();
        config.gateway.enabled = true;
        assert!(validate_config(&config).is_err());
        config.gateway.bearer_token = Some("s3cret".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn weights_cannot_both_be_zero() {
        let mut config = MurmurConfig::default();
        config.retrieval.semantic_weight = 0.0;
        config.retrieval.keyword_weight = 0.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("must not both be zero"));
    }
}
