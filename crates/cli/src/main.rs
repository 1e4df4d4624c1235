// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! council - client for the council coordinator daemon

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{daemon, session, worker};
use council_daemon::lifecycle::Config;

use crate::client::{ClientError, DaemonClient};
use crate::output::{ActionView, OutcomeRow, OutputFormat};

#[derive(Parser)]
#[command(
    name = "council",
    version,
    about = "Council - coordinate one prompt across several AI workers"
)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value_t)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management
    Session(session::SessionArgs),
    /// Worker slot commands
    Worker(worker::WorkerArgs),
    /// Send a message to every reachable worker
    Broadcast(BroadcastArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
}

#[derive(Args)]
struct BroadcastArgs {
    /// Message kind
    kind: String,
    /// JSON payload
    #[arg(long, default_value = "null")]
    payload: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    let result = run(cli, &config).await;

    // Surface the recovery hint that came with a rejection
    if let Err(e) = &result {
        if let Some(action) = e.downcast_ref::<ClientError>().and_then(ClientError::action) {
            eprintln!("{}", ActionView(action));
        }
    }
    result
}

async fn run(cli: Cli, config: &Config) -> Result<()> {
    let format = cli.output;

    match cli.command {
        // Doesn't need a client connection
        Commands::Daemon(args) => daemon::handle(args, config, format).await?,
        Commands::Session(args) => {
            let client = DaemonClient::connect_or_start(config).await?;
            session::handle(args.command, &client, format).await?
        }
        Commands::Worker(args) => {
            let client = DaemonClient::connect_or_start(config).await?;
            worker::handle(args.command, &client, format).await?
        }
        Commands::Broadcast(args) => {
            let payload: serde_json::Value = serde_json::from_str(&args.payload)?;
            let client = DaemonClient::connect_or_start(config).await?;
            let outcomes = client.broadcast(args.kind, payload).await?;
            let rows: Vec<OutcomeRow<'_>> = outcomes.iter().map(OutcomeRow).collect();
            output::print_list(&rows, format, "No workers");
        }
    }

    Ok(())
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level
fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
