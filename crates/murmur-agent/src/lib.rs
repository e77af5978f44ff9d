// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session management and memory orchestration for Murmur.
//!
//! The [`MemoryOrchestrator`] is the façade transports call: `handle_turn`
//! resolves the session and gathers context, `record_turn` persists a turn
//! and queues its enrichment on a bounded worker pool. Background loops
//! sweep idle sessions and consolidate aged history.

pub mod background;
pub mod enrichment;
pub mod orchestrator;
pub mod session;
pub mod shutdown;

pub use background::{spawn_consolidation_scheduler, spawn_idle_sweeper};
pub use enrichment::{EnrichmentJob, EnrichmentQueue, EnrichmentStats, Enricher};
pub use orchestrator::{
    Collaborators, ContextBundle, MemoryOrchestrator, NewMemory, StatusReport, StoreStatus,
    TurnContext,
};
pub use session::{SessionManager, SessionOrigin};
