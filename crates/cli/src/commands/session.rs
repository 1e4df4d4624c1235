// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `council session` - Session lifecycle commands

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use council_core::{Phase, SessionId};

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat, SessionView, SummaryRow};

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Create a session with a slot for every configured worker
    New,
    /// Show the state of a session
    Show {
        /// Session ID
        id: SessionId,
    },
    /// List known sessions
    List,
    /// Move a session to another phase
    Phase {
        /// Session ID
        id: SessionId,
        /// idle, stage1, stage2, stage3, complete or error
        phase: Phase,
    },
    /// Stop tracking a session for liveness
    End {
        /// Session ID
        id: SessionId,
    },
    /// Delete a session from both stores
    Delete {
        /// Session ID
        id: SessionId,
    },
}

pub async fn handle(
    command: SessionCommand,
    client: &DaemonClient,
    format: OutputFormat,
) -> Result<()> {
    match command {
        SessionCommand::New => {
            let id = client.create_session().await?;
            match format {
                OutputFormat::Text => println!("Created session {}", id),
                OutputFormat::Json => println!("{}", serde_json::json!({ "sessionId": id })),
            }
        }
        SessionCommand::Show { id } => match client.get_session(&id).await? {
            Some(record) => output::print(&SessionView(&record), format),
            None => bail!("Session not found: {}", id),
        },
        SessionCommand::List => {
            let sessions = client.list_sessions().await?;
            let rows: Vec<SummaryRow<'_>> = sessions.iter().map(SummaryRow).collect();
            output::print_list(&rows, format, "No sessions");
        }
        SessionCommand::Phase { id, phase } => {
            client.set_phase(&id, phase).await?;
            println!("Session {} is now in {}", id, phase);
        }
        SessionCommand::End { id } => {
            client.end_session(&id).await?;
            println!("Ended session {}", id);
        }
        SessionCommand::Delete { id } => {
            client.delete_session(&id).await?;
            println!("Deleted session {}", id);
        }
    }
    Ok(())
}
