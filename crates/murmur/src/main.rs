// SPDX-FileCopyrightText: 2026 Murmur Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Murmur - conversational memory core for voice assistants.
//!
//! Binary entry point: loads configuration, wires the adapters, and runs
//! one of the subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod wiring;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use murmur_config::model::MurmurConfig;

/// Murmur - conversational memory core for voice assistants.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the memory core: background loops plus the HTTP gateway when enabled.
    Serve,
    /// Summarize aged conversation history now.
    Consolidate {
        /// Only this user; all users with eligible history otherwise.
        #[arg(long)]
        user: Option<String>,
        /// Override the configured age cutoff.
        #[arg(long)]
        cutoff_days: Option<u32>,
    },
    /// Report store reachability, circuit states and queue counters.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Close a session so it is never reused.
    CloseSession {
        /// Session id.
        id: String,
    },
}

fn load_config(path: Option<&std::path::Path>) -> MurmurConfig {
    let loaded = match path {
        Some(path) => murmur_config::load_and_validate_path(path),
        None => murmur_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            murmur_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("murmur={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Consolidate { user, cutoff_days }) => {
            commands::run_consolidate(config, user.as_deref(), cutoff_days).await
        }
        Some(Commands::Status { json }) => commands::run_status(config, json).await,
        Some(Commands::CloseSession { id }) => commands::run_close_session(config, &id).await,
        None => {
            println!("murmur: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_consolidate_flags() {
        let cli = Cli::try_parse_from([
            "murmur",
            "--config",
            "/tmp/m.toml",
            "consolidate",
            "--user",
            "alice",
            "--cutoff-days",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/m.toml")));
        match cli.command {
            Some(Commands::Consolidate { user, cutoff_days }) => {
                assert_eq!(user.as_deref(), Some("alice"));
                assert_eq!(cutoff_days, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_requires_session_id_for_close() {
        assert!(Cli::try_parse_from(["murmur", "close-session"]).is_err());
        let cli = Cli::try_parse_from(["murmur", "close-session", "s-1"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CloseSession { id }) if id == "s-1"));
    }

    #[test]
    #[serial_test::serial]
    fn config_file_and_env_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(&path, "[session]\ntimeout_secs = 900\n").unwrap();

        // SAFETY: serialized with the other env-touching tests.
        unsafe { std::env::set_var("MURMUR_RETRIEVAL_LIMIT", "4") };
        let config = murmur_config::load_and_validate_path(&path);
        unsafe { std::env::remove_var("MURMUR_RETRIEVAL_LIMIT") };

        let config = config.unwrap();
        assert_eq!(config.session.timeout_secs, 900);
        assert_eq!(config.retrieval.limit, 4);
        assert_eq!(config.agent.name, "murmur");
    }
}
