// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `murmur serve` command implementation.
//!
//! Runs the idle sweeper, the consolidation scheduler and, when enabled, the
//! HTTP gateway until SIGINT or SIGTERM, then drains enrichment work and
//! closes the store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use murmur_agent::shutdown;
use murmur_agent::{spawn_consolidation_scheduler, spawn_idle_sweeper};
use murmur_config::model::MurmurConfig;
use murmur_core::MurmurError;
use murmur_gateway::GatewayState;

use crate::wiring::build_core;

/// Upper bound on waiting for queued enrichment at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run_serve(config: MurmurConfig) -> Result<(), MurmurError> {
    info!(name = %config.agent.name, "starting murmur serve");

    let prometheus = murmur_gateway::prometheus::install_recorder()?;
    let core = build_core(&config).await?;
    let cancel = shutdown::install_signal_handler();

    let mut tasks = vec![spawn_idle_sweeper(Arc::clone(&core))];
    tasks.extend(spawn_consolidation_scheduler(Arc::clone(&core)));

    let gateway = if config.gateway.enabled {
        let state = GatewayState::new(Arc::clone(&core), config.gateway.bearer_token.clone())
            .with_metrics(Arc::new(move || prometheus.render()));
        let gateway_config = config.gateway.clone();
        let gateway_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            murmur_gateway::start_server(&gateway_config, state, gateway_cancel).await
        }))
    } else {
        info!("gateway disabled");
        None
    };

    info!("murmur ready");
    cancel.cancelled().await;
    info!("shutting down");

    if let Some(gateway) = gateway {
        match gateway.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "gateway exited with an error"),
            Err(e) => error!(error = %e, "gateway task panicked"),
        }
    }

    shutdown::drain(&core, DRAIN_TIMEOUT).await;
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "background task panicked");
        }
    }
    info!("murmur stopped");
    Ok(())
}
