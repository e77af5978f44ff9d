// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Murmur configuration system.

use std::path::Path;

use murmur_config::diagnostic::ConfigError;
use murmur_config::model::MurmurConfig;
use murmur_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "kitchen-assistant"
log_level = "debug"

[session]
timeout_secs = 900
reactivation_window_secs = 300
short_term_turns = 6

[breaker.llm_embed]
failure_threshold = 2
open_timeout_secs = 10

[retrieval]
similarity_threshold = 0.6
semantic_weight = 0.5
keyword_weight = 0.5

[consolidation]
cutoff_days = 3
chunk_min = 5
chunk_max = 8

[gateway]
enabled = true
port = 8088
bearer_token = "t0ken"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.agent.name, "kitchen-assistant");
    assert_eq!(config.session.timeout_secs, 900);
    assert_eq!(config.session.reactivation_window_secs, 300);
    assert_eq!(config.session.short_term_turns, 6);
    assert_eq!(config.breaker.llm_embed.failure_threshold, 2);
    assert_eq!(config.breaker.llm_embed.open_timeout_secs, 10);
    // Untouched breaker fields keep their per-dependency defaults.
    assert_eq!(config.breaker.llm_embed.call_timeout_ms, 5_000);
    assert_eq!(config.retrieval.semantic_weight, 0.5);
    assert_eq!(config.consolidation.chunk_max, 8);
    assert_eq!(config.gateway.port, 8088);
}

#[test]
fn defaults_match_documented_values() {
    let config = MurmurConfig::default();

    assert_eq!(config.session.timeout_secs, 1800);
    assert_eq!(config.session.reactivation_window_secs, 600);
    assert_eq!(config.session.sweep_interval_secs, 60);
    assert_eq!(config.breaker.llm_generate.failure_threshold, 5);
    assert_eq!(config.breaker.llm_generate.open_timeout_secs, 60);
    assert_eq!(config.breaker.db.failure_threshold, 3);
    assert_eq!(config.breaker.db.open_timeout_secs, 30);
    assert_eq!(config.retrieval.similarity_threshold, 0.7);
    assert_eq!(config.retrieval.semantic_weight, 0.7);
    assert_eq!(config.retrieval.keyword_weight, 0.3);
    assert_eq!(config.retrieval.rrf_k, 60.0);
    assert_eq!(config.retrieval.facts_limit, 10);
    assert_eq!(config.entity.resolution_threshold, 0.8);
    assert_eq!(config.consolidation.cutoff_days, 7);
    assert_eq!(config.consolidation.chunk_min, 10);
    assert_eq!(config.consolidation.chunk_max, 20);
    assert_eq!(config.write_retry.max_attempts, 3);
    assert!(!config.gateway.enabled);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty config should load");
    assert_eq!(config.agent.name, "murmur");
    assert_eq!(config.worker.workers, 2);
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[session]
timout_secs = 60
"#;

    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            valid_keys,
            ..
        } => {
            assert_eq!(key, "timout_secs");
            assert_eq!(suggestion.as_deref(), Some("timeout_secs"));
            assert!(valid_keys.contains("reactivation_window_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n").unwrap_err();
    assert!(matches!(errors[0], ConfigError::UnknownKey { .. }));
}

#[test]
fn wrong_type_reports_invalid_type() {
    let errors = load_and_validate_str("[session]\ntimeout_secs = \"soon\"\n").unwrap_err();
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "session.timeout_secs"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn semantic_validation_runs_after_load() {
    let toml = r#"
[consolidation]
chunk_min = 25
chunk_max = 20
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
fn env_vars_override_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "murmur.toml",
            r#"
[session]
timeout_secs = 900

[breaker.db]
failure_threshold = 4
"#,
        )?;
        jail.set_env("MURMUR_SESSION_TIMEOUT_SECS", "120");
        jail.set_env("MURMUR_BREAKER_DB_OPEN_TIMEOUT_SECS", "5");
        jail.set_env("MURMUR_WRITE_RETRY_MAX_ATTEMPTS", "4");

        let config = load_config_from_path(Path::new("murmur.toml"))?;
        assert_eq!(config.session.timeout_secs, 120);
        assert_eq!(config.breaker.db.failure_threshold, 4);
        assert_eq!(config.breaker.db.open_timeout_secs, 5);
        assert_eq!(config.write_retry.max_attempts, 4);
        Ok(())
    });
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};

    let errors = load_and_validate_str("[agent]\nnaem = \"x\"\n").unwrap_err();
    let mut out = String::new();
    let diagnostic: &dyn Diagnostic = &errors[0];
    GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor())
        .render_report(&mut out, diagnostic)
        .expect("render should succeed");
    assert!(out.contains("naem"));
    assert!(out.contains("did you mean `name`"));
}
