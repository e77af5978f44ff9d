// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Murmur memory core.
//!
//! `/health` and `/metrics` are public; everything under `/v1` requires the
//! configured bearer token and maps onto a [`murmur_agent::MemoryOrchestrator`]
//! operation.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod prometheus;
pub mod server;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, router, start_server};
