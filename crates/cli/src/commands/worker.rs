// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `council worker` - Commands addressed to one worker slot

use anyhow::Result;
use clap::{Args, Subcommand};
use council_core::{FailureSignal, SendMode, SessionId, WorkerIdentity, WorkerKey, WorkerStatus};

use crate::client::DaemonClient;
use crate::output::{self, ActionView, OutputFormat};

#[derive(Args)]
pub struct WorkerArgs {
    #[command(subcommand)]
    pub command: WorkerCommand,
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Bind a worker slot to a worker endpoint
    Attach {
        /// Session ID
        session: SessionId,
        /// Worker slot (e.g. claude)
        worker: WorkerKey,
        /// Endpoint identity under the workers directory
        identity: WorkerIdentity,
    },
    /// Record a status reported for a worker
    Status {
        session: SessionId,
        worker: WorkerKey,
        /// not_connected, ready, input_ready, awaiting_dispatch, dispatching,
        /// streaming, complete or error
        status: WorkerStatus,
        /// Error text to record with the status
        #[arg(long)]
        error: Option<String>,
    },
    /// Fetch the worker's latest response text
    Capture { session: SessionId, worker: WorkerKey },
    /// Hand a prompt to the worker
    Dispatch {
        session: SessionId,
        worker: WorkerKey,
        prompt: String,
        /// manual, semi_assisted or automated; capped by the worker's policy
        #[arg(long)]
        mode: Option<SendMode>,
    },
    /// Report a failure and print the recovery to follow
    Fail {
        session: SessionId,
        /// worker_disconnected, ui_incompatible, rate_limited,
        /// coordinator_restarted or unknown
        signal: FailureSignal,
        /// Worker the failure applies to
        #[arg(long)]
        worker: Option<WorkerKey>,
    },
}

pub async fn handle(
    command: WorkerCommand,
    client: &DaemonClient,
    format: OutputFormat,
) -> Result<()> {
    match command {
        WorkerCommand::Attach {
            session,
            worker,
            identity,
        } => {
            client.attach_worker(&session, &worker, identity.clone()).await?;
            println!("Attached {} to {}", worker, identity);
        }
        WorkerCommand::Status {
            session,
            worker,
            status,
            error,
        } => {
            client.status_update(&session, &worker, status, error).await?;
            println!("{} is {}", worker, status);
        }
        WorkerCommand::Capture { session, worker } => {
            let text = client.capture(&session, &worker).await?;
            match format {
                OutputFormat::Text => println!("{}", text),
                OutputFormat::Json => println!("{}", serde_json::json!({ "text": text })),
            }
        }
        WorkerCommand::Dispatch {
            session,
            worker,
            prompt,
            mode,
        } => {
            let (mode, delivered, warning) =
                client.dispatch(&session, &worker, prompt, mode).await?;
            if let Some(warning) = &warning {
                eprintln!("warning: {}", warning);
            }
            match format {
                OutputFormat::Text if delivered => {
                    println!("Prompt delivered to {} ({})", worker, mode)
                }
                OutputFormat::Text => {
                    println!("{} is in manual mode; paste the prompt yourself", worker)
                }
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({
                        "mode": mode,
                        "delivered": delivered,
                        "warning": warning,
                    })
                ),
            }
        }
        WorkerCommand::Fail {
            session,
            signal,
            worker,
        } => {
            let action = client.report_failure(&session, worker, signal).await?;
            output::print(&ActionView(&action), format);
        }
    }
    Ok(())
}
