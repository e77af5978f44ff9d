// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`MurmurError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use murmur_core::MurmurError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Handler error wrapper so `?` works on orchestrator calls.
#[derive(Debug)]
pub struct ApiError(pub MurmurError);

impl From<MurmurError> for ApiError {
    fn from(err: MurmurError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            MurmurError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            MurmurError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            MurmurError::DependencyUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "dependency_unavailable")
            }
            MurmurError::DependencyTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "dependency_timeout")
            }
            MurmurError::ParseFailure(_) => (StatusCode::BAD_GATEWAY, "parse_failure"),
            MurmurError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider"),
            MurmurError::Config(_) | MurmurError::Storage { .. } | MurmurError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}
