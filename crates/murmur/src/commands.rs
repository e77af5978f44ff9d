// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot administrative subcommands: `consolidate`, `status` and
//! `close-session`. Each opens the store, does its work, and shuts the core
//! down again.

use std::fmt::Write as _;
use std::time::Duration;

use murmur_agent::StatusReport;
use murmur_config::model::MurmurConfig;
use murmur_core::MurmurError;
use murmur_core::types::ConsolidationRun;

use crate::wiring::build_core;

const ONE_SHOT_DRAIN: Duration = Duration::from_secs(5);

pub async fn run_consolidate(
    config: MurmurConfig,
    user: Option<&str>,
    cutoff_days: Option<u32>,
) -> Result<(), MurmurError> {
    let core = build_core(&config).await?;
    let result = core.run_consolidation(user, cutoff_days).await;
    core.shutdown(ONE_SHOT_DRAIN).await?;
    print!("{}", format_runs(&result?));
    Ok(())
}

pub async fn run_status(config: MurmurConfig, json: bool) -> Result<(), MurmurError> {
    let core = build_core(&config).await?;
    let report = core.status().await;
    core.shutdown(ONE_SHOT_DRAIN).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| MurmurError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", format_status(&report));
    }
    Ok(())
}

pub async fn run_close_session(config: MurmurConfig, id: &str) -> Result<(), MurmurError> {
    let core = build_core(&config).await?;
    let result = core.close_session(id).await;
    core.shutdown(ONE_SHOT_DRAIN).await?;
    if result? {
        println!("session {id} closed");
    } else {
        println!("session {id} was already closed");
    }
    Ok(())
}

fn format_runs(runs: &[ConsolidationRun]) -> String {
    if runs.is_empty() {
        return "nothing to consolidate\n".to_string();
    }
    let mut out = String::new();
    for run in runs {
        let _ = writeln!(
            out,
            "{:<24} messages={:<5} summaries={:<4} tokens_saved~{}",
            run.user_id, run.messages_consolidated, run.summaries_created, run.tokens_saved_estimate
        );
    }
    out
}

fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "  murmur status");
    let _ = writeln!(out, "  {}", "-".repeat(35));
    let store = if report.store.reachable {
        "[OK] reachable".to_string()
    } else {
        format!(
            "[FAIL] {}",
            report.store.error.as_deref().unwrap_or("unreachable")
        )
    };
    let _ = writeln!(out, "    Store:    {store}");
    if let Some(active) = report.active_sessions {
        let _ = writeln!(out, "    Sessions: {active} active");
    }
    let _ = writeln!(
        out,
        "    Queue:    {} pending, {} dropped, {} workers",
        report.enrichment.pending, report.enrichment.dropped, report.enrichment.workers
    );
    let _ = writeln!(out, "    Circuits:");
    for breaker in &report.breakers {
        let _ = writeln!(
            out,
            "      {:<14} {:<10} failures={}",
            breaker.dependency, breaker.state, breaker.consecutive_failures
        );
    }
    let _ = writeln!(out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_agent::{EnrichmentStats, StoreStatus};
    use murmur_resilience::{CircuitSnapshot, CircuitState};

    fn report(reachable: bool) -> StatusReport {
        StatusReport {
            healthy: reachable,
            store: StoreStatus {
                reachable,
                error: (!reachable).then(|| "database is locked".to_string()),
            },
            active_sessions: reachable.then_some(2),
            breakers: vec![CircuitSnapshot {
                dependency: "llm_embed".into(),
                state: CircuitState::Open,
                consecutive_failures: 5,
                opened_at: None,
            }],
            enrichment: EnrichmentStats {
                pending: 1,
                dropped: 3,
                workers: 4,
            },
        }
    }

    #[test]
    fn status_lists_store_and_circuits() {
        let text = format_status(&report(true));
        assert!(text.contains("[OK] reachable"));
        assert!(text.contains("2 active"));
        assert!(text.contains("llm_embed"));
        assert!(text.contains("open"));
        assert!(text.contains("3 dropped"));
    }

    #[test]
    fn status_shows_store_error() {
        let text = format_status(&report(false));
        assert!(text.contains("[FAIL] database is locked"));
        assert!(!text.contains("Sessions:"));
    }

    #[test]
    fn runs_render_one_line_each() {
        let run = ConsolidationRun {
            id: "r1".into(),
            user_id: "alice".into(),
            cutoff_date: "2026-03-01T00:00:00.000Z".into(),
            messages_consolidated: 20,
            summaries_created: 1,
            tokens_saved_estimate: 410,
            run_at: "2026-03-08T00:00:00.000Z".into(),
        };
        let text = format_runs(&[run]);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("messages=20"));
        assert_eq!(format_runs(&[]), "nothing to consolidate\n");
    }
}
