// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Murmur memory core.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Murmur adapter traits and core operations.
///
/// Calls guarded by a circuit breaker never surface [`MurmurError::Provider`]
/// to callers: they are normalized to [`MurmurError::DependencyUnavailable`]
/// or [`MurmurError::DependencyTimeout`].
#[derive(Debug, Error)]
pub enum MurmurError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// A dependency is unavailable, either because its breaker is open or
    /// because the underlying call failed.
    #[error("dependency {dependency} unavailable: {message}")]
    DependencyUnavailable { dependency: String, message: String },

    /// A dependency did not answer within its call timeout.
    #[error("dependency {dependency} timed out after {duration:?}")]
    DependencyTimeout { dependency: String, duration: Duration },

    /// Malformed LLM or extraction output.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// A session, entity, or memory id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad input that cannot be clamped to a safe default.
    #[error("validation error: {0}")]
    Validation(String),

    /// Raw LLM/speech adapter failure (HTTP error, bad status, decode error).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MurmurError {
    /// Shorthand for a [`MurmurError::Storage`] built from any displayable error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        MurmurError::Storage {
            source: err.to_string().into(),
        }
    }

    /// Shorthand for [`MurmurError::NotFound`].
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        MurmurError::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// True for errors raised by a guarded external dependency.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            MurmurError::DependencyUnavailable { .. } | MurmurError::DependencyTimeout { .. }
        )
    }

    /// True for errors that may succeed on retry (store hiccups, timeouts).
    ///
    /// An open breaker is not transient from the caller's point of view: the
    /// breaker will keep rejecting until its open timeout elapses.
    pub fn is_transient(&self) -> bool {
        match self {
            MurmurError::Storage { .. } | MurmurError::DependencyTimeout { .. } => true,
            MurmurError::DependencyUnavailable { message, .. } => message != CIRCUIT_OPEN,
            _ => false,
        }
    }
}

/// Message carried by [`MurmurError::DependencyUnavailable`] when the breaker
/// rejected the call without attempting it.
pub const CIRCUIT_OPEN: &str = "circuit open";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_transient() {
        assert!(MurmurError::storage("disk I/O error").is_transient());
        assert!(!MurmurError::Validation("bad".into()).is_transient());
    }

    #[test]
    fn open_circuit_is_not_transient() {
        let open = MurmurError::DependencyUnavailable {
            dependency: "db".into(),
            message: CIRCUIT_OPEN.into(),
        };
        assert!(open.is_dependency_failure());
        assert!(!open.is_transient());

        let failed = MurmurError::DependencyUnavailable {
            dependency: "db".into(),
            message: "connection reset".into(),
        };
        assert!(failed.is_transient());
    }

    #[test]
    fn display_includes_dependency_name() {
        let err = MurmurError::DependencyTimeout {
            dependency: "llm_embed".into(),
            duration: Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "dependency llm_embed timed out after 500ms");
    }
}
