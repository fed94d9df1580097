// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `prox` - declarative process supervisor and local HTTPS proxy.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prox", version, about = "Process supervisor and local HTTPS reverse proxy")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = "prox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (foreground unless -d)
    Up {
        /// Detach and run in the background
        #[arg(short, long)]
        detach: bool,
    },
    /// Stop the running daemon
    Down,
    /// Show daemon status
    Status,
    /// List processes
    Ps,
    /// Start a process
    Start { name: String },
    /// Stop a process
    Stop { name: String },
    /// Restart a process
    Restart { name: String },
    /// Show or follow logs
    Logs {
        /// Comma-separated process names (default: all)
        #[arg(short, long)]
        process: Option<String>,
        /// Pattern to match lines against
        #[arg(long)]
        pattern: Option<String>,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
        /// Number of history lines
        #[arg(short = 'n', long)]
        lines: Option<usize>,
        /// Follow new entries
        #[arg(short, long)]
        follow: bool,
    },
    /// List or follow proxied requests
    Requests {
        #[arg(long)]
        subdomain: Option<String>,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        min_status: Option<u16>,
        #[arg(long)]
        max_status: Option<u16>,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Follow new requests
        #[arg(short, long)]
        follow: bool,
    },
    /// Show one proxied request
    Request {
        id: String,
        /// Include captured bodies
        #[arg(long)]
        body: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if prox_daemon::should_run_as_daemon() {
                EnvFilter::new("info")
            } else {
                EnvFilter::new("warn")
            }
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Up { detach } => commands::up(&cli.config, detach).await,
        Command::Down => commands::down(&cli.config).await,
        Command::Status => commands::status(&cli.config).await,
        Command::Ps => commands::ps(&cli.config).await,
        Command::Start { name } => commands::process_action(&cli.config, "start", &name).await,
        Command::Stop { name } => commands::process_action(&cli.config, "stop", &name).await,
        Command::Restart { name } => commands::process_action(&cli.config, "restart", &name).await,
        Command::Logs { process, pattern, regex, lines, follow } => {
            commands::logs(&cli.config, process, pattern, regex, lines, follow).await
        }
        Command::Requests { subdomain, method, min_status, max_status, limit, follow } => {
            commands::requests(&cli.config, subdomain, method, min_status, max_status, limit, follow)
                .await
        }
        Command::Request { id, body } => commands::request(&cli.config, &id, body).await,
    }
}
