// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic background loops: the idle-session sweep and scheduled
//! consolidation. Both stop when the orchestrator's token is cancelled and
//! never run on a turn's critical path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::orchestrator::MemoryOrchestrator;

/// Spawn the idle sweep, running every `session.sweep_interval_secs`.
pub fn spawn_idle_sweeper(orchestrator: Arc<MemoryOrchestrator>) -> JoinHandle<()> {
    let every = Duration::from_secs(orchestrator.config().session.sweep_interval_secs.max(1));
    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match orchestrator.sweep_idle().await {
                        Ok(0) => debug!("idle sweep found nothing"),
                        Ok(count) => debug!(count, "idle sweep complete"),
                        Err(e) => warn!(error = %e, "idle sweep failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("idle sweeper stopping");
                    break;
                }
            }
        }
    })
}

/// Spawn scheduled consolidation across all users, if enabled.
pub fn spawn_consolidation_scheduler(
    orchestrator: Arc<MemoryOrchestrator>,
) -> Option<JoinHandle<()>> {
    let config = &orchestrator.config().consolidation;
    if !config.enabled {
        info!("scheduled consolidation disabled");
        return None;
    }
    let every = Duration::from_secs(config.interval_secs.max(1));
    let cancel = orchestrator.cancellation();
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match orchestrator.run_consolidation(None, None).await {
                        Ok(runs) => {
                            let messages: i64 = runs.iter().map(|r| r.messages_consolidated).sum();
                            info!(users = runs.len(), messages, "scheduled consolidation finished");
                        }
                        Err(e) => warn!(error = %e, "scheduled consolidation failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("consolidation scheduler stopping");
                    break;
                }
            }
        }
    }))
}
