// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus recorder installation and metric descriptions.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use murmur_core::MurmurError;

/// Install the global Prometheus recorder. Only one recorder may be
/// installed per process.
pub fn install_recorder() -> Result<PrometheusHandle, MurmurError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MurmurError::Internal(format!("failed to install Prometheus recorder: {e}")))?;
    register_metrics();
    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Describe every metric the memory core emits.
pub fn register_metrics() {
    describe_counter!("murmur_turns_total", "Turns handled");
    describe_gauge!("murmur_active_sessions", "Sessions currently active");
    describe_counter!(
        "murmur_enrichment_dropped_total",
        "Enrichment jobs dropped because the queue was full or closed"
    );
    describe_histogram!(
        "murmur_retrieval_latency_seconds",
        "Hybrid retrieval latency in seconds"
    );
    describe_counter!(
        "murmur_retrieval_degraded_total",
        "Retrievals that skipped a source"
    );
    describe_counter!(
        "murmur_consolidated_messages_total",
        "Raw messages replaced by summaries"
    );
    describe_gauge!(
        "murmur_breaker_state",
        "Circuit state per dependency (0 closed, 1 half-open, 2 open)"
    );
    describe_counter!(
        "murmur_breaker_failures_total",
        "Failed calls counted by a breaker"
    );
    describe_counter!(
        "murmur_breaker_rejections_total",
        "Calls rejected by an open breaker"
    );
}
