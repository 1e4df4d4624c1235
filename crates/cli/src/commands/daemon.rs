// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `council daemon` - Coordinator process management

use anyhow::Result;
use clap::{Args, Subcommand};
use council_daemon::lifecycle::Config;
use council_daemon::Response;
use serde::Serialize;
use std::fmt;

use crate::client::{self, ClientError, DaemonClient};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon if it is not running
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Print the tail of the daemon log
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

#[derive(Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
enum DaemonStatus {
    NotRunning,
    Running {
        version: String,
        uptime_secs: u64,
        sessions_active: usize,
        channels_open: usize,
        liveness_armed: bool,
    },
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::NotRunning => write!(f, "Daemon not running"),
            DaemonStatus::Running {
                version,
                uptime_secs,
                sessions_active,
                channels_open,
                liveness_armed,
            } => {
                writeln!(f, "Daemon running (protocol {})", version)?;
                writeln!(f, "  Uptime: {}s", uptime_secs)?;
                writeln!(f, "  Active sessions: {}", sessions_active)?;
                writeln!(f, "  Open channels: {}", channels_open)?;
                write!(
                    f,
                    "  Liveness: {}",
                    if *liveness_armed { "armed" } else { "idle" }
                )
            }
        }
    }
}

pub async fn handle(args: DaemonArgs, config: &Config, format: OutputFormat) -> Result<()> {
    match args.command {
        DaemonCommand::Start => {
            let client = DaemonClient::connect_or_start(config).await?;
            let version = client.hello().await?;
            println!("Daemon running (protocol {})", version);
        }
        DaemonCommand::Stop => {
            if client::daemon_stop(config).await? {
                println!("Daemon stopped");
            } else {
                println!("Daemon not running");
            }
        }
        DaemonCommand::Status => {
            let status = status(config).await?;
            output::print(&status, format);
        }
        DaemonCommand::Logs { lines } => {
            let content = match std::fs::read_to_string(&config.log_path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No log at {}", config.log_path.display());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            let all: Vec<&str> = content.lines().collect();
            for line in &all[all.len().saturating_sub(lines)..] {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

async fn status(config: &Config) -> Result<DaemonStatus> {
    let client = match DaemonClient::connect(config) {
        Ok(client) => client,
        Err(ClientError::DaemonNotRunning) => return Ok(DaemonStatus::NotRunning),
        Err(e) => return Err(e.into()),
    };

    // A socket left behind by a killed daemon refuses connections
    let version = match client.hello().await {
        Ok(version) => version,
        Err(ClientError::Io(_)) => return Ok(DaemonStatus::NotRunning),
        Err(e) => return Err(e.into()),
    };

    match client.status().await? {
        Response::Status {
            uptime_secs,
            sessions_active,
            channels_open,
            liveness_armed,
        } => Ok(DaemonStatus::Running {
            version,
            uptime_secs,
            sessions_active,
            channels_open,
            liveness_armed,
        }),
        _ => Err(ClientError::UnexpectedResponse.into()),
    }
}
