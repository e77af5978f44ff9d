// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./murmur.toml` > `~/.config/murmur/murmur.toml` > `/etc/murmur/murmur.toml`
//! with environment variable overrides via `MURMUR_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MurmurConfig;

/// Top-level sections, matched against env var names after the prefix.
const SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "session",
    "breaker",
    "retrieval",
    "entity",
    "extraction",
    "consolidation",
    "worker",
    "write_retry",
    "cache",
    "ollama",
    "gateway",
];

/// Breaker sub-sections. Longest names first so `llm_generate` wins over a
/// hypothetical `llm` prefix.
const BREAKERS: &[&str] = &["llm_generate", "llm_embed", "stt", "tts", "db"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/murmur/murmur.toml` (system-wide)
/// 3. `~/.config/murmur/murmur.toml` (user XDG config)
/// 4. `./murmur.toml` (local directory)
/// 5. `MURMUR_*` environment variables
pub fn load_config() -> Result<MurmurConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
///
/// Used by tests.
pub fn load_config_from_str(toml_content: &str) -> Result<MurmurConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MurmurConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MurmurConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MurmurConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MurmurConfig::default()))
        .merge(Toml::file("/etc/murmur/murmur.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("murmur/murmur.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("murmur.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `MURMUR_SECTION_KEY` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `MURMUR_SESSION_TIMEOUT_SECS` must become
/// `session.timeout_secs`, not `session.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("MURMUR_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        else {
            continue;
        };
        if *section == "breaker" {
            for dep in BREAKERS {
                if let Some(field) = rest.strip_prefix(dep).and_then(|r| r.strip_prefix('_')) {
                    return format!("breaker.{dep}.{field}");
                }
            }
        }
        return format!("{section}.{rest}");
    }
    key.to_string()
}
